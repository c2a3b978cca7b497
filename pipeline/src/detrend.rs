//! De-trending collaborator contract.
//!
//! The fitting method (regression, cross-validation, outlier rejection) lives
//! outside the core. A [`Detrender`] receives the current [`Lightcurve`] and
//! returns an additive [`Model`]; the target validates and installs it.

use ndarray::Array1;

use crate::models::Lightcurve;

/// Errors raised by a de-trending collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    #[error("Not enough usable cadences to fit: need {needed}, have {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("{0}")]
    Failed(String),
}

impl FitError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// An additive model and optional uncertainty, one value per cadence.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub flux: Array1<f64>,
    pub error: Option<Array1<f64>>,
}

impl Model {
    pub fn new(flux: Array1<f64>) -> Self {
        Self { flux, error: None }
    }

    pub fn with_error(mut self, error: Array1<f64>) -> Self {
        self.error = Some(error);
        self
    }

    pub fn len(&self) -> usize {
        self.flux.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flux.is_empty()
    }
}

/// Produces a de-trending model for a light curve.
///
/// Implementations must return a model of `lightcurve.len()` cadences; a
/// wrong length is rejected when the model is installed.
pub trait Detrender {
    fn fit(&self, lightcurve: &Lightcurve) -> Result<Model, FitError>;
}

/// The all-zero placeholder model.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroModel;

impl Detrender for ZeroModel {
    fn fit(&self, lightcurve: &Lightcurve) -> Result<Model, FitError> {
        Ok(Model::new(Array1::zeros(lightcurve.len())))
    }
}

/// Adapter turning a closure into a [`Detrender`].
#[derive(Clone)]
pub struct FnDetrender<F>(F);

impl<F> Detrender for FnDetrender<F>
where
    F: Fn(&Lightcurve) -> Result<Model, FitError>,
{
    fn fit(&self, lightcurve: &Lightcurve) -> Result<Model, FitError> {
        (self.0)(lightcurve)
    }
}

impl<F> std::fmt::Debug for FnDetrender<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnDetrender")
    }
}

/// Wrap a closure as a [`Detrender`].
///
/// ```
/// use lcpipe::detrend::{from_fn, Detrender, Model};
///
/// let median = from_fn(|lc| {
///     let mut flux = lc.raw_flux().to_vec();
///     flux.sort_by(f64::total_cmp);
///     let level = flux[flux.len() / 2];
///     Ok(Model::new(lc.raw_flux().mapv(|_| level)))
/// });
/// # let _ = &median as &dyn Detrender;
/// ```
pub fn from_fn<F>(f: F) -> FnDetrender<F>
where
    F: Fn(&Lightcurve) -> Result<Model, FitError>,
{
    FnDetrender(f)
}
