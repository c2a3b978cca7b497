//! Error types for the reduction pipeline.
//!
//! Every core operation returns [`PipelineResult`]. Failures raised by a
//! mission (acquisition, aperture selection) are not translated here; they are
//! carried unchanged by [`crate::target::TargetError`].

use crate::detrend::FitError;
use crate::report::{LayoutError, RenderError};
use crate::target::{PipelineState, Stage};

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Error type for the reduction core.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Array dimensions are inconsistent (flux vs error cube, mask vs stamp,
    /// model vs raw series length). Fatal to the current stage.
    #[error("Shape mismatch in {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        what: &'static str,
        expected: String,
        found: String,
    },

    /// Aperture mask is empty, has the wrong shape, or is missing.
    #[error("Invalid aperture: {0}")]
    InvalidAperture(String),

    /// The de-trending collaborator did not produce a model.
    #[error("Model fit failed")]
    Fit(#[from] FitError),

    /// Layout specification could not be parsed, or a report role has no cell.
    #[error("Invalid report layout")]
    Layout(#[from] LayoutError),

    /// The report renderer failed to write the artifact.
    #[error("Report rendering failed")]
    Render(#[from] RenderError),

    /// A pipeline stage was requested before its prerequisites completed.
    #[error("Cannot run stage '{stage}' while target is in state '{state}'")]
    OutOfOrder {
        stage: Stage,
        state: PipelineState,
    },
}

impl PipelineError {
    /// Create a shape mismatch error from any two debuggable shapes.
    pub fn shape_mismatch(
        what: &'static str,
        expected: impl std::fmt::Debug,
        found: impl std::fmt::Debug,
    ) -> Self {
        Self::ShapeMismatch {
            what,
            expected: format!("{:?}", expected),
            found: format!("{:?}", found),
        }
    }

    /// Create a shape mismatch error for 1-D series lengths.
    pub fn length_mismatch(what: &'static str, expected: usize, found: usize) -> Self {
        Self::ShapeMismatch {
            what,
            expected: format!("length {}", expected),
            found: format!("length {}", found),
        }
    }

    /// Create an invalid aperture error.
    pub fn invalid_aperture(message: impl Into<String>) -> Self {
        Self::InvalidAperture(message.into())
    }

    /// Whether re-invoking the failed stage can succeed without new input.
    ///
    /// Fits and renders may fail transiently; shape, aperture, layout and
    /// ordering errors will fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fit(_) | Self::Render(_))
    }
}
