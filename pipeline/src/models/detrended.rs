//! Additive de-trending model applied to a raw aperture series.

use ndarray::{Array1, ArrayView1, Zip};

use crate::error::{PipelineError, PipelineResult};

/// An additive model and its uncertainty, bound to a raw series of fixed length.
///
/// The corrected series are derived on demand from the raw series:
///
/// - `flux = raw_flux - model`
/// - `error = sqrt(raw_error^2 + model_error^2)`
#[derive(Debug, Clone, PartialEq)]
pub struct DetrendedSeries {
    model: Array1<f64>,
    model_error: Array1<f64>,
}

impl DetrendedSeries {
    /// The initial all-zero model for a raw series of `len` cadences.
    pub fn zeros(len: usize) -> Self {
        Self {
            model: Array1::zeros(len),
            model_error: Array1::zeros(len),
        }
    }

    pub fn len(&self) -> usize {
        self.model.len()
    }

    pub fn is_empty(&self) -> bool {
        self.model.is_empty()
    }

    pub fn model(&self) -> ArrayView1<'_, f64> {
        self.model.view()
    }

    pub fn model_error(&self) -> ArrayView1<'_, f64> {
        self.model_error.view()
    }

    /// Install a new model. A missing `model_error` means zero uncertainty.
    ///
    /// # Errors
    /// [`PipelineError::ShapeMismatch`] if either series differs in length from
    /// the bound raw series; the current model is left untouched.
    pub fn set_model(
        &mut self,
        model: Array1<f64>,
        model_error: Option<Array1<f64>>,
    ) -> PipelineResult<()> {
        let len = self.len();
        if model.len() != len {
            return Err(PipelineError::length_mismatch("model", len, model.len()));
        }
        let model_error = match model_error {
            Some(error) if error.len() != len => {
                return Err(PipelineError::length_mismatch("model error", len, error.len()));
            }
            Some(error) => error,
            None => Array1::zeros(len),
        };

        self.model = model;
        self.model_error = model_error;
        Ok(())
    }

    /// Model-corrected flux for the given raw flux.
    pub fn flux(&self, raw_flux: ArrayView1<f64>) -> Array1<f64> {
        &raw_flux - &self.model
    }

    /// Propagated error for the given raw error.
    pub fn error(&self, raw_error: ArrayView1<f64>) -> Array1<f64> {
        // hypot(r, 0) == |r| exactly, so a zero model error leaves the raw error untouched
        Zip::from(&raw_error)
            .and(&self.model_error)
            .map_collect(|raw, model| raw.hypot(*model))
    }
}
