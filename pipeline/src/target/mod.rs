//! Per-star pipeline.
//!
//! A [`Target`] owns the whole reduction graph of one star and drives it
//! through `acquire -> aperture -> fit -> report`. Each stage checks its
//! precondition and leaves the target in its last good state on failure, so
//! partial results stay inspectable.

mod state;

#[cfg(test)]
mod target_tests;

pub use state::{PipelineState, Stage};

use std::fmt;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use qtty::Seconds;
use tracing::{debug, info};

use crate::detrend::Detrender;
use crate::error::{PipelineError, PipelineResult};
use crate::mission::Mission;
use crate::models::{Aperture, Lightcurve, Season, TargetId};
use crate::report::{CellContent, CellRole, ReportLayout, ReportPage, ReportRenderer, SeriesPlot};

/// Failure of a target stage.
///
/// Mission failures are carried unchanged; everything else is a
/// [`PipelineError`].
#[derive(Debug, thiserror::Error)]
pub enum TargetError<E>
where
    E: std::error::Error + 'static,
{
    #[error("Acquisition failed")]
    Acquisition(#[source] E),

    #[error("Aperture selection failed")]
    ApertureSelection(#[source] E),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl<E: std::error::Error + 'static> TargetError<E> {
    /// Whether re-invoking the failed stage may succeed.
    ///
    /// Acquisition goes through the archive and is treated as transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            TargetError::Acquisition(_) => true,
            TargetError::ApertureSelection(_) => false,
            TargetError::Pipeline(e) => e.is_retryable(),
        }
    }
}

/// One star processed by a mission.
pub struct Target<M: Mission> {
    mission: M,
    id: TargetId,
    season: Option<Season>,
    magnitude: Option<f64>,
    cadence: Option<Seconds>,
    labels: bool,
    lightcurve: Option<Lightcurve>,
    state: PipelineState,
}

impl<M: Mission> Target<M> {
    pub fn new(mission: M, id: impl Into<TargetId>) -> Self {
        Self {
            mission,
            id: id.into(),
            season: None,
            magnitude: None,
            cadence: None,
            labels: false,
            lightcurve: None,
            state: PipelineState::Created,
        }
    }

    /// Read a specific season instead of letting the mission choose.
    pub fn with_season(mut self, season: Season) -> Self {
        self.season = Some(season);
        self
    }

    /// Known magnitude; overrides what the archive reports.
    pub fn with_magnitude(mut self, magnitude: f64) -> Self {
        self.magnitude = Some(magnitude);
        self
    }

    pub fn with_cadence(mut self, cadence: Seconds) -> Self {
        self.cadence = Some(cadence);
        self
    }

    /// Mark empty report cells with their numbers.
    pub fn with_labels(mut self, labels: bool) -> Self {
        self.labels = labels;
        self
    }

    // ==================== Accessors ====================

    pub fn mission(&self) -> &M {
        &self.mission
    }

    pub fn id(&self) -> &TargetId {
        &self.id
    }

    /// Identifier as the mission displays it.
    pub fn display_id(&self) -> String {
        self.mission.format_identifier(&self.id)
    }

    /// Season, once requested or resolved by acquisition.
    pub fn season(&self) -> Option<Season> {
        self.season
    }

    pub fn magnitude(&self) -> Option<f64> {
        self.magnitude
    }

    /// Cadence override, or the mission default.
    pub fn cadence(&self) -> Seconds {
        self.cadence
            .unwrap_or_else(|| self.mission.default_cadence())
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// The light curve, present from [`PipelineState::RawAcquired`] on.
    pub fn lightcurve(&self) -> Option<&Lightcurve> {
        self.lightcurve.as_ref()
    }

    fn check(&self, stage: Stage) -> PipelineResult<()> {
        if stage.allowed_from(self.state) {
            Ok(())
        } else {
            Err(PipelineError::OutOfOrder {
                stage,
                state: self.state,
            })
        }
    }

    fn loaded(&self, stage: Stage) -> PipelineResult<&Lightcurve> {
        self.lightcurve.as_ref().ok_or(PipelineError::OutOfOrder {
            stage,
            state: self.state,
        })
    }

    fn loaded_mut(&mut self, stage: Stage) -> PipelineResult<&mut Lightcurve> {
        let state = self.state;
        self.lightcurve
            .as_mut()
            .ok_or(PipelineError::OutOfOrder { stage, state })
    }

    // ==================== Stages ====================

    /// Retrieve the raw stamp from the mission.
    ///
    /// Allowed once, from [`PipelineState::Created`].
    pub fn acquire(&mut self) -> Result<(), TargetError<M::Error>> {
        self.check(Stage::Acquire)?;

        let acquisition = self
            .mission
            .acquire_raw(&self.id, self.season)
            .map_err(TargetError::Acquisition)?;

        self.season = Some(acquisition.season);
        if self.magnitude.is_none() {
            self.magnitude = acquisition.magnitude;
        }
        debug!(
            target_id = %self.id,
            cadences = acquisition.stamp.ncads(),
            rows = acquisition.stamp.nrows(),
            cols = acquisition.stamp.ncols(),
            "Raw stamp acquired"
        );
        self.lightcurve = Some(Lightcurve::new(acquisition.stamp));
        self.advance(Stage::Acquire);
        Ok(())
    }

    /// Install the mission's default aperture.
    pub fn select_aperture(&mut self) -> Result<(), TargetError<M::Error>> {
        self.check(Stage::Aperture)?;
        let stamp = self.loaded(Stage::Aperture)?.raw();
        let mask = self
            .mission
            .select_aperture(stamp)
            .map_err(TargetError::ApertureSelection)?;
        self.set_aperture(mask)?;
        Ok(())
    }

    /// Install an explicit aperture mask.
    ///
    /// A mask that is empty or does not match the stamp shape is rejected as
    /// [`PipelineError::InvalidAperture`].
    ///
    /// The current model is kept, but the target drops back to
    /// [`PipelineState::ApertureSet`] so the next report requires a refit.
    pub fn set_aperture(&mut self, mask: Array2<u8>) -> PipelineResult<()> {
        self.check(Stage::Aperture)?;
        let lightcurve = self.loaded_mut(Stage::Aperture)?;
        let (rows, cols) = (lightcurve.raw().nrows(), lightcurve.raw().ncols());
        let aperture = Aperture::for_shape(mask, (rows, cols)).map_err(|e| match e {
            PipelineError::ShapeMismatch { expected, found, .. } => PipelineError::invalid_aperture(
                format!("mask shape {} does not match stamp shape {}", found, expected),
            ),
            other => other,
        })?;
        let npix = aperture.npix();
        lightcurve.install_aperture(aperture)?;

        debug!(target_id = %self.id, npix, "Aperture installed");
        self.advance(Stage::Aperture);
        Ok(())
    }

    /// Fit and install a de-trending model.
    pub fn fit<D: Detrender + ?Sized>(&mut self, detrender: &D) -> PipelineResult<()> {
        self.check(Stage::Fit)?;
        let lightcurve = self.loaded_mut(Stage::Fit)?;
        let model = detrender.fit(lightcurve)?;
        lightcurve.set_model(model.flux, model.error)?;

        if let Some(scatter) = lightcurve.scatter_ppm() {
            debug!(target_id = %self.id, scatter_ppm = scatter, "Model installed");
        }
        self.advance(Stage::Fit);
        Ok(())
    }

    /// Lay out the report page for the current light curve.
    pub fn report_page(&self) -> PipelineResult<ReportPage> {
        self.check(Stage::Report)?;
        let lightcurve = self.loaded(Stage::Report)?;

        let layout = ReportLayout::parse(&self.mission.layout_spec())?
            .with_roles(&self.mission.report_roles())?;
        let mut page = ReportPage::new(&layout);

        let time = lightcurve.time().to_vec();
        let time_unit = self.mission.time_unit();
        let raw = SeriesPlot::new("Raw", time.clone(), lightcurve.raw_flux().to_vec())
            .with_labels(time_unit, "SAP Flux")
            .with_errors(lightcurve.raw_error().to_vec());
        let detrended = SeriesPlot::new("De-trended", time, lightcurve.flux().to_vec())
            .with_labels(time_unit, "Flux")
            .with_errors(lightcurve.error().to_vec());

        let cells = [
            (CellRole::Header, CellContent::Text(self.header_lines(lightcurve))),
            (CellRole::RawPanel, CellContent::Series(raw)),
            (CellRole::DetrendedPanel, CellContent::Series(detrended)),
            (CellRole::Footer, CellContent::Text(footer_lines(lightcurve))),
        ];
        for (role, content) in cells {
            if let Some(cell) = layout.cell_for(role) {
                page.set(cell.id, content);
            }
        }
        if self.labels {
            page.label_empty_cells();
        }
        Ok(page)
    }

    fn header_lines(&self, lightcurve: &Lightcurve) -> Vec<String> {
        let season = self
            .season
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unresolved".to_string());
        let magnitude = self
            .magnitude
            .map(|m| format!("{:.2}", m))
            .unwrap_or_else(|| "n/a".to_string());
        vec![
            format!("{} / {}", self.mission.name(), self.display_id()),
            format!(
                "Season {}   {} = {}   Cadence {:.0} s",
                season,
                self.mission.magnitude_band(),
                magnitude,
                self.cadence().value()
            ),
            format!(
                "{} cadences, {} pixels in aperture",
                lightcurve.len(),
                lightcurve.raw().npix()
            ),
        ]
    }

    /// Render the report to `path`, replacing any previous artifact.
    pub fn report<R: ReportRenderer + ?Sized>(
        &mut self,
        renderer: &R,
        path: &Path,
    ) -> PipelineResult<()> {
        let page = self.report_page()?;
        renderer.render(&page, path)?;
        info!(target_id = %self.id, path = %path.display(), "Report written");
        self.advance(Stage::Report);
        Ok(())
    }

    /// Default report location inside `dir`, e.g. `k2-205071984-c05.svg`.
    pub fn report_path(&self, dir: &Path, extension: &str) -> PathBuf {
        let mut name = format!("{}-{}", self.mission.name().to_lowercase(), self.id);
        if let Some(season) = self.season {
            name.push_str(&format!("-c{:02}", season.value()));
        }
        dir.join(format!("{}.{}", name, extension))
    }

    /// Run every remaining stage and write the report into `dir`.
    ///
    /// Acquisition and default aperture selection happen only if they have
    /// not been done yet; the model is always refit.
    pub fn run<D, R>(
        &mut self,
        detrender: &D,
        renderer: &R,
        dir: &Path,
    ) -> Result<PathBuf, TargetError<M::Error>>
    where
        D: Detrender + ?Sized,
        R: ReportRenderer + ?Sized,
    {
        if self.state == PipelineState::Created {
            self.acquire()?;
        }
        if self.state == PipelineState::RawAcquired {
            self.select_aperture()?;
        }
        self.fit(detrender)?;
        let path = self.report_path(dir, renderer.extension());
        self.report(renderer, &path)?;
        Ok(path)
    }

    fn advance(&mut self, stage: Stage) {
        let from = self.state;
        self.state = stage.completes();
        info!(target_id = %self.id, stage = %stage, from = %from, to = %self.state, "Stage complete");
    }
}

fn footer_lines(lightcurve: &Lightcurve) -> Vec<String> {
    let scatter = lightcurve
        .scatter_ppm()
        .map(|s| format!("{:.1} ppm", s))
        .unwrap_or_else(|| "n/a".to_string());
    vec![
        format!("lcpipe v{}", env!("CARGO_PKG_VERSION")),
        format!("Scatter: {}", scatter),
        format!(
            "Generated {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        ),
    ]
}

impl<M: Mission> fmt::Display for Target<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} Target: {}>", self.mission.name(), self.display_id())
    }
}

impl<M: Mission + fmt::Debug> fmt::Debug for Target<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("mission", &self.mission)
            .field("id", &self.id)
            .field("season", &self.season)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
