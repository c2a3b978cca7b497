//! Light curves: a raw stamp and the de-trended series bound to it.

use std::sync::OnceLock;

use ndarray::{Array1, Array2, ArrayView1};

use super::aperture::Aperture;
use super::detrended::DetrendedSeries;
use super::stamp::PixelStamp;
use crate::error::PipelineResult;

/// Median absolute deviation to Gaussian sigma.
const MAD_TO_SIGMA: f64 = 1.4826;

#[derive(Debug, Clone)]
struct CorrectedSeries {
    flux: Array1<f64>,
    error: Array1<f64>,
}

/// Single owner of a raw [`PixelStamp`] and its [`DetrendedSeries`].
///
/// The corrected flux/error are cached and dropped whenever the aperture, the
/// model or the raw stamp change, so reads always reflect the current model.
#[derive(Debug, Clone)]
pub struct Lightcurve {
    raw: PixelStamp,
    detrended: DetrendedSeries,
    corrected: OnceLock<CorrectedSeries>,
}

impl Lightcurve {
    /// Bind a zero model to a freshly acquired stamp.
    pub fn new(raw: PixelStamp) -> Self {
        let detrended = DetrendedSeries::zeros(raw.ncads());
        Self {
            raw,
            detrended,
            corrected: OnceLock::new(),
        }
    }

    pub fn raw(&self) -> &PixelStamp {
        &self.raw
    }

    pub fn detrended(&self) -> &DetrendedSeries {
        &self.detrended
    }

    /// Number of cadences.
    pub fn len(&self) -> usize {
        self.raw.ncads()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn time(&self) -> ArrayView1<'_, f64> {
        self.raw.time()
    }

    /// Raw aperture-summed flux.
    pub fn raw_flux(&self) -> ArrayView1<'_, f64> {
        self.raw.flux()
    }

    pub fn raw_error(&self) -> ArrayView1<'_, f64> {
        self.raw.error()
    }

    fn corrected(&self) -> &CorrectedSeries {
        self.corrected.get_or_init(|| CorrectedSeries {
            flux: self.detrended.flux(self.raw.flux()),
            error: self.detrended.error(self.raw.error()),
        })
    }

    /// De-trended flux.
    pub fn flux(&self) -> ArrayView1<'_, f64> {
        self.corrected().flux.view()
    }

    /// De-trended flux error.
    pub fn error(&self) -> ArrayView1<'_, f64> {
        self.corrected().error.view()
    }

    pub fn set_aperture(&mut self, mask: Array2<u8>) -> PipelineResult<()> {
        self.raw.set_aperture(mask)?;
        self.corrected = OnceLock::new();
        Ok(())
    }

    pub fn install_aperture(&mut self, aperture: Aperture) -> PipelineResult<()> {
        self.raw.install_aperture(aperture)?;
        self.corrected = OnceLock::new();
        Ok(())
    }

    /// Install a model; see [`DetrendedSeries::set_model`].
    pub fn set_model(
        &mut self,
        model: Array1<f64>,
        model_error: Option<Array1<f64>>,
    ) -> PipelineResult<()> {
        self.detrended.set_model(model, model_error)?;
        self.corrected = OnceLock::new();
        Ok(())
    }

    /// Replace the raw stamp, re-binding a zero model of the new length.
    ///
    /// Returns the previous stamp.
    pub fn replace_raw(&mut self, raw: PixelStamp) -> PixelStamp {
        self.detrended = DetrendedSeries::zeros(raw.ncads());
        self.corrected = OnceLock::new();
        std::mem::replace(&mut self.raw, raw)
    }

    /// Robust scatter of the de-trended flux in parts per million.
    ///
    /// `1.4826 * MAD / median * 1e6` over the finite samples; `None` with fewer
    /// than two finite samples or a non-positive median.
    pub fn scatter_ppm(&self) -> Option<f64> {
        let mut values: Vec<f64> = self.flux().iter().copied().filter(|v| v.is_finite()).collect();
        if values.len() < 2 {
            return None;
        }
        let center = median(&mut values)?;
        if center <= 0.0 {
            return None;
        }
        let mut deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
        let mad = median(&mut deviations)?;
        Some(MAD_TO_SIGMA * mad / center * 1e6)
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}
