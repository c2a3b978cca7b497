//! Pipeline states and stage preconditions.

use std::fmt;

use serde::Serialize;

/// Progress of a target through the pipeline, in strict forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Created,
    RawAcquired,
    ApertureSet,
    ModelFit,
    Reported,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Created => "created",
            PipelineState::RawAcquired => "raw_acquired",
            PipelineState::ApertureSet => "aperture_set",
            PipelineState::ModelFit => "model_fit",
            PipelineState::Reported => "reported",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pipeline step that can be requested on a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Acquire,
    Aperture,
    Fit,
    Report,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Acquire => "acquire",
            Stage::Aperture => "aperture",
            Stage::Fit => "fit",
            Stage::Report => "report",
        }
    }

    /// Earliest state from which the stage may run.
    pub fn requires(&self) -> PipelineState {
        match self {
            Stage::Acquire => PipelineState::Created,
            Stage::Aperture => PipelineState::RawAcquired,
            Stage::Fit => PipelineState::ApertureSet,
            Stage::Report => PipelineState::ModelFit,
        }
    }

    /// State reached when the stage succeeds.
    pub fn completes(&self) -> PipelineState {
        match self {
            Stage::Acquire => PipelineState::RawAcquired,
            Stage::Aperture => PipelineState::ApertureSet,
            Stage::Fit => PipelineState::ModelFit,
            Stage::Report => PipelineState::Reported,
        }
    }

    /// Whether the stage may run from `state`.
    ///
    /// Acquisition happens exactly once; every later stage may be re-run from
    /// any state at or past its prerequisite.
    pub fn allowed_from(&self, state: PipelineState) -> bool {
        match self {
            Stage::Acquire => state == PipelineState::Created,
            _ => state >= self.requires(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
