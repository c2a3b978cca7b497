//! The K2 mission, backed by a local stamp archive.
//!
//! Stamps are stored as JSON [`StampFile`]s, one per target and campaign:
//!
//! ```text
//! <data_dir>/k2/c05/205071984.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array2, Axis, Zip};
use qtty::Seconds;
use tracing::{debug, info};

use super::{Acquisition, Mission};
use crate::error::PipelineError;
use crate::models::{PixelStamp, Season, StampFile, TargetId};
use crate::report::{ReportRoles, DEFAULT_LAYOUT};

/// Long cadence integration, in seconds.
pub const LONG_CADENCE: f64 = 1800.0;
/// Short cadence integration, in seconds.
pub const SHORT_CADENCE: f64 = 60.0;

/// Errors raised while reading the K2 archive.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("No stamp for target {target_id}{}", campaign_suffix(.season))]
    NotFound {
        target_id: String,
        season: Option<Season>,
    },

    #[error("I/O error on {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed stamp file {}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Target name '{target_id}' cannot be used as an archive file name")]
    InvalidId { target_id: String },

    #[error("Invalid stamp")]
    Stamp(#[from] PipelineError),
}

fn campaign_suffix(season: &Option<Season>) -> String {
    season
        .map(|s| format!(" in campaign {}", s))
        .unwrap_or_default()
}

impl ArchiveError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether a later attempt may succeed (e.g. once the file is present).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Io { .. })
    }
}

/// The K2 mission.
#[derive(Debug, Clone)]
pub struct K2 {
    root: PathBuf,
    cadence: Seconds,
}

impl K2 {
    /// A K2 archive under `<data_dir>/k2`, long cadence.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            root: data_dir.as_ref().join("k2"),
            cadence: Seconds::new(LONG_CADENCE),
        }
    }

    /// Use short cadence as the default.
    pub fn short_cadence(mut self) -> Self {
        self.cadence = Seconds::new(SHORT_CADENCE);
        self
    }

    pub fn archive_dir(&self) -> &Path {
        &self.root
    }

    pub fn campaign_dir(&self, season: Season) -> PathBuf {
        self.root.join(format!("c{:02}", season.value()))
    }

    /// File holding `id` in `season`.
    ///
    /// Names must be a single plain path component.
    pub fn stamp_path(&self, id: &TargetId, season: Season) -> Result<PathBuf, ArchiveError> {
        if let TargetId::Name(name) = id {
            let mut components = Path::new(name.as_str()).components();
            let plain = matches!(
                (components.next(), components.next()),
                (Some(std::path::Component::Normal(_)), None)
            );
            if !plain || name.contains(['/', '\\']) {
                return Err(ArchiveError::InvalidId {
                    target_id: name.clone(),
                });
            }
        }
        Ok(self.campaign_dir(season).join(format!("{}.json", id)))
    }

    /// Campaigns present in the archive, ascending. A missing archive has none.
    pub fn campaigns(&self) -> Result<Vec<Season>, ArchiveError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ArchiveError::io(&self.root, e)),
        };

        let mut seasons = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ArchiveError::io(&self.root, e))?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name();
            let season = name
                .to_str()
                .and_then(|n| n.strip_prefix('c'))
                .and_then(|n| n.parse::<Season>().ok());
            if let Some(season) = season {
                seasons.push(season);
            }
        }
        seasons.sort();
        Ok(seasons)
    }

    /// Store a stamp in the archive, creating the campaign directory.
    pub fn write_stamp(
        &self,
        id: &TargetId,
        season: Season,
        file: &StampFile,
    ) -> Result<PathBuf, ArchiveError> {
        let path = self.stamp_path(id, season)?;
        let dir = self.campaign_dir(season);
        fs::create_dir_all(&dir).map_err(|e| ArchiveError::io(&dir, e))?;
        let json = serde_json::to_vec(file).map_err(|source| ArchiveError::Malformed {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json).map_err(|e| ArchiveError::io(&path, e))?;
        debug!(target_id = %id, season = %season, path = %path.display(), "Stored K2 stamp");
        Ok(path)
    }

    fn locate(&self, id: &TargetId, season: Option<Season>) -> Result<(PathBuf, Season), ArchiveError> {
        let not_found = || ArchiveError::NotFound {
            target_id: id.to_string(),
            season,
        };
        match season {
            Some(season) => {
                let path = self.stamp_path(id, season)?;
                if path.is_file() {
                    Ok((path, season))
                } else {
                    Err(not_found())
                }
            }
            None => {
                for season in self.campaigns()? {
                    let path = self.stamp_path(id, season)?;
                    if path.is_file() {
                        return Ok((path, season));
                    }
                }
                Err(not_found())
            }
        }
    }

    fn read_stamp_file(path: &Path) -> Result<StampFile, ArchiveError> {
        let text = fs::read_to_string(path).map_err(|e| ArchiveError::io(path, e))?;
        serde_json::from_str(&text).map_err(|source| ArchiveError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Mission for K2 {
    type Error = ArchiveError;

    fn name(&self) -> &str {
        "K2"
    }

    fn format_identifier(&self, id: &TargetId) -> String {
        match id {
            TargetId::Number(n) => format!("EPIC {}", n),
            TargetId::Name(name) => name.clone(),
        }
    }

    fn time_unit(&self) -> &str {
        "BJD - 2454833"
    }

    fn magnitude_band(&self) -> &str {
        "Kp"
    }

    fn acquire_raw(
        &self,
        id: &TargetId,
        season: Option<Season>,
    ) -> Result<Acquisition, ArchiveError> {
        let (path, campaign) = self.locate(id, season)?;
        let mut file = Self::read_stamp_file(&path)?;

        let season = file.season.take().unwrap_or(campaign);
        let magnitude = file.magnitude.take();
        let stamp = PixelStamp::from_stamp_file(file)?;

        info!(
            target_id = %id,
            campaign = %season,
            cadences = stamp.ncads(),
            "Loaded K2 stamp from {}",
            path.display()
        );
        Ok(Acquisition {
            stamp,
            season,
            magnitude,
        })
    }

    /// Pixels of the current aperture with at least one finite flux sample.
    ///
    /// An all-NaN stamp yields an empty mask, which the caller rejects.
    fn select_aperture(&self, stamp: &PixelStamp) -> Result<Array2<u8>, ArchiveError> {
        let finite = stamp
            .flux_cube()
            .map_axis(Axis(0), |series| series.iter().any(|v| v.is_finite()));
        Ok(Zip::from(&finite)
            .and(stamp.aperture().mask())
            .map_collect(|&has_data, &mask| u8::from(has_data && mask & 1 != 0)))
    }

    fn default_cadence(&self) -> Seconds {
        self.cadence
    }

    fn layout_spec(&self) -> String {
        DEFAULT_LAYOUT.to_string()
    }

    fn report_roles(&self) -> ReportRoles {
        ReportRoles::default()
    }
}
