//! Run-scoped observability.
//!
//! Library code only emits `tracing` events. [`RunTelemetry`] decides where
//! they go for the duration of one pipeline run: it installs a thread-scoped
//! subscriber (stdout and/or a log file) when the run starts and removes it
//! when the returned [`RunGuard`] is dropped. Nothing is installed globally.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::dispatcher::DefaultGuard;
use tracing::span::EnteredSpan;
use tracing::{error, info_span};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingSettings;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Invalid log filter '{directive}'")]
    Filter {
        directive: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("Cannot open log file {}", .path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where the events of a run are sent.
#[derive(Debug, Clone, PartialEq)]
pub struct RunTelemetry {
    filter: String,
    stdout: bool,
    file: Option<PathBuf>,
}

impl Default for RunTelemetry {
    fn default() -> Self {
        Self::new("info")
    }
}

impl RunTelemetry {
    /// Log to stdout with a `tracing` filter directive such as `info` or
    /// `lcpipe=debug`.
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            stdout: true,
            file: None,
        }
    }

    pub fn from_settings(settings: &LoggingSettings) -> Self {
        Self {
            filter: settings.level.clone(),
            stdout: !settings.quiet,
            file: settings.file.clone(),
        }
    }

    /// Silence stdout.
    pub fn quiet(mut self) -> Self {
        self.stdout = false;
        self
    }

    /// Also append events, without colors, to `path`. Missing parent
    /// directories are created when the run starts.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Install the subscriber on the current thread and open a run span.
    ///
    /// Events from this thread go to the configured sinks until the guard is
    /// dropped. Worker threads must enter the subscriber themselves (see
    /// [`crate::batch`]).
    pub fn start(&self, label: &str) -> Result<RunGuard, TelemetryError> {
        let filter = EnvFilter::try_new(&self.filter).map_err(|source| TelemetryError::Filter {
            directive: self.filter.clone(),
            source,
        })?;

        let stdout_layer = self
            .stdout
            .then(|| fmt::layer().with_target(true).with_thread_ids(true));

        let file_layer = match &self.file {
            Some(path) => {
                let log_error = |source| TelemetryError::LogFile {
                    path: path.clone(),
                    source,
                };
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(log_error)?;
                }
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(log_error)?;
                Some(
                    fmt::layer()
                        .with_ansi(false)
                        .with_target(true)
                        .with_writer(Mutex::new(file)),
                )
            }
            None => None,
        };

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .with(file_layer);
        let subscriber = tracing::subscriber::set_default(subscriber);
        let span = info_span!("run", label = %label).entered();

        Ok(RunGuard {
            span,
            _subscriber: subscriber,
        })
    }
}

/// Keeps a run's subscriber installed; dropping it ends the run.
#[must_use = "dropping the guard immediately uninstalls the run subscriber"]
pub struct RunGuard {
    // Exits before the subscriber below is removed
    span: EnteredSpan,
    _subscriber: DefaultGuard,
}

impl RunGuard {
    /// Log a failure that ends the run, with its full source chain.
    pub fn record_failure(&self, err: &(dyn std::error::Error + 'static)) {
        let mut chain = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push_str(": ");
            chain.push_str(&cause.to_string());
            source = cause.source();
        }
        error!(parent: self.span.id(), error = %chain, "Run failed");
    }
}

impl std::fmt::Debug for RunGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunGuard").field("span", &self.span.id()).finish()
    }
}
