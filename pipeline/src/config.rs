//! Pipeline configuration.
//!
//! Settings are read from a TOML file (`lcpipe.toml`) and then overridden by
//! environment variables:
//!
//! - `LCPIPE_DATA_DIR`: root of the mission archives
//! - `LCPIPE_REPORT_DIR`: where reports are written
//! - `LCPIPE_LOG_LEVEL`: tracing filter directive, e.g. `debug` or `lcpipe=trace`
//! - `LCPIPE_MAX_CONCURRENCY`: number of targets processed at once in a batch
//!
//! Every section and key is optional.
//!
//! ```toml
//! [paths]
//! data_dir = "/data/lcpipe"
//! report_dir = "reports"
//!
//! [logging]
//! level = "info"
//! file = "lcpipe.log"
//!
//! [report]
//! labels = true
//!
//! [batch]
//! max_concurrency = 8
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "lcpipe.toml";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("No lcpipe.toml found in standard locations")]
    NotFound,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub report: ReportSettings,
    #[serde(default)]
    pub batch: BatchSettings,
}

/// Data and output locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    /// Root of the mission archives (`<data_dir>/k2/...`)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            report_dir: default_report_dir(),
        }
    }
}

/// Run-scoped logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `tracing` filter directive
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Also append plain-text logs to this file
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Do not log to stdout
    #[serde(default)]
    pub quiet: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            quiet: false,
        }
    }
}

/// Report page geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSettings {
    #[serde(default = "default_page_width")]
    pub width: u32,
    #[serde(default = "default_page_height")]
    pub height: u32,
    #[serde(default = "default_page_margin")]
    pub margin: u32,
    /// Number the empty cells of every page
    #[serde(default)]
    pub labels: bool,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            width: default_page_width(),
            height: default_page_height(),
            margin: default_page_margin(),
            labels: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSettings {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    match env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".lcpipe"),
        None => PathBuf::from(".lcpipe"),
    }
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_page_width() -> u32 {
    850
}

fn default_page_height() -> u32 {
    1100
}

fn default_page_margin() -> u32 {
    48
}

fn default_max_concurrency() -> usize {
    4
}

impl PipelineConfig {
    /// Parse configuration text. Environment overrides are not applied.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<string>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file. Environment overrides are not
    /// applied.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: PipelineConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `lcpipe.toml` from the first standard location that has one.
    ///
    /// Searches for `lcpipe.toml` in:
    /// 1. Current directory
    /// 2. `pipeline/` directory
    /// 3. Parent directory
    pub fn from_default_location() -> Result<Self, ConfigError> {
        let search_paths = [
            PathBuf::from(CONFIG_FILE_NAME),
            Path::new("pipeline").join(CONFIG_FILE_NAME),
            Path::new("..").join(CONFIG_FILE_NAME),
        ];

        for path in search_paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(ConfigError::NotFound)
    }

    /// Default-location file if any, else built-in defaults; then environment
    /// overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::from_default_location() {
            Ok(config) => config,
            Err(ConfigError::NotFound) => Self::default(),
            Err(e) => return Err(e),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `LCPIPE_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from any key lookup, with the same keys as
    /// [`PipelineConfig::apply_env`].
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("LCPIPE_DATA_DIR") {
            self.paths.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("LCPIPE_REPORT_DIR") {
            self.paths.report_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup("LCPIPE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(value) = lookup("LCPIPE_MAX_CONCURRENCY") {
            self.batch.max_concurrency = value.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!(
                    "LCPIPE_MAX_CONCURRENCY must be a positive integer, got '{}'",
                    value
                ))
            })?;
        }
        self.validate()
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "batch.max_concurrency must be at least 1".to_string(),
            ));
        }
        let report = &self.report;
        if report.margin.saturating_mul(2) >= report.width.min(report.height) {
            return Err(ConfigError::Invalid(format!(
                "report.margin {} leaves no room on a {}x{} page",
                report.margin, report.width, report.height
            )));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.level is empty".to_string()));
        }
        Ok(())
    }

    /// SVG renderer sized per `[report]`.
    #[cfg(feature = "svg-report")]
    pub fn svg_renderer(&self) -> crate::report::SvgRenderer {
        crate::report::SvgRenderer::new(self.report.width, self.report.height, self.report.margin)
    }
}
