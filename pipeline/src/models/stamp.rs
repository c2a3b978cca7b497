//! Pixel stamps and the aperture-photometry reduction algebra.
//!
//! A stamp holds `N` cadences of a `rows x cols` pixel image (flux and 1-sigma
//! error) plus the aperture used to reduce it. Reduction selects the aperture
//! pixels of every cadence and collapses them:
//!
//! - flux: NaN-safe sum (NaN pixels contribute zero)
//! - error: square root of the NaN-safe sum of squared pixel errors, i.e. the
//!   quadrature sum for independent pixel noise
//!
//! Derived series are computed on first access and cached until the aperture
//! is replaced.

use std::fmt;
use std::sync::OnceLock;

use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, Axis};

use super::aperture::Aperture;
use crate::error::{PipelineError, PipelineResult};

/// Aperture-dependent series derived from a stamp.
#[derive(Debug, Clone)]
struct ApertureSeries {
    flux2d: Array2<f64>,
    error2d: Array2<f64>,
    flux: Array1<f64>,
    error: Array1<f64>,
}

impl ApertureSeries {
    fn compute(flux: ArrayView3<f64>, error: ArrayView3<f64>, aperture: &Aperture) -> Self {
        let flux2d = pixel_series(flux, aperture);
        let error2d = pixel_series(error, aperture);
        let flux = aperture_sum(flux2d.view());
        let error = quadrature_sum(error2d.view());
        Self {
            flux2d,
            error2d,
            flux,
            error,
        }
    }
}

/// Collapse a `(N, rows, cols)` cube to the `(N, npix)` series of the aperture
/// pixels, columns in the aperture's row-major pixel order.
///
/// The caller guarantees the aperture shape matches the cube.
pub fn pixel_series(cube: ArrayView3<f64>, aperture: &Aperture) -> Array2<f64> {
    let ncads = cube.len_of(Axis(0));
    let pixels = aperture.pixels();
    Array2::from_shape_fn((ncads, pixels.len()), |(t, p)| {
        let (row, col) = pixels[p];
        cube[[t, row, col]]
    })
}

/// NaN-safe sum over pixels for every cadence of an `(N, npix)` series.
pub fn aperture_sum(pixels: ArrayView2<f64>) -> Array1<f64> {
    pixels.map_axis(Axis(1), |row| row.iter().filter(|v| !v.is_nan()).sum::<f64>())
}

/// NaN-safe quadrature sum over pixels for every cadence of an `(N, npix)`
/// error series.
pub fn quadrature_sum(errors: ArrayView2<f64>) -> Array1<f64> {
    errors.map_axis(Axis(1), |row| {
        row.iter()
            .filter(|v| !v.is_nan())
            .map(|e| e * e)
            .sum::<f64>()
            .sqrt()
    })
}

/// Reduce a flux cube and its error cube through an optional mask.
///
/// An absent mask selects every pixel of the stamp.
///
/// # Errors
/// - [`PipelineError::ShapeMismatch`] if the cubes differ in shape or the mask
///   does not match the stamp
/// - [`PipelineError::InvalidAperture`] if the mask selects no pixels
pub fn aperture_photometry(
    flux: ArrayView3<f64>,
    error: ArrayView3<f64>,
    mask: Option<ArrayView2<u8>>,
) -> PipelineResult<(Array1<f64>, Array1<f64>)> {
    if flux.dim() != error.dim() {
        return Err(PipelineError::shape_mismatch(
            "error cube",
            flux.dim(),
            error.dim(),
        ));
    }
    let (_, rows, cols) = flux.dim();
    let aperture = match mask {
        Some(mask) => Aperture::for_shape(mask.to_owned(), (rows, cols))?,
        None => Aperture::full(rows, cols)?,
    };
    let series = ApertureSeries::compute(flux, error, &aperture);
    Ok((series.flux, series.error))
}

/// Raw pixel cube of one target plus its aperture.
///
/// Effectively immutable: only the aperture may be replaced after
/// construction, which drops every cached aperture-dependent series.
#[derive(Debug, Clone)]
pub struct PixelStamp {
    time: Array1<f64>,
    flux: Array3<f64>,
    error: Array3<f64>,
    aperture: Aperture,
    reduced: OnceLock<ApertureSeries>,
}

impl PixelStamp {
    /// Create a stamp from a time axis, a `(N, rows, cols)` flux cube, an
    /// optional error cube (zeros when absent) and an optional aperture mask
    /// (the full stamp when absent).
    ///
    /// # Errors
    /// - [`PipelineError::ShapeMismatch`] if `time`, `flux`, `error` or the
    ///   mask disagree in shape
    /// - [`PipelineError::InvalidAperture`] if the aperture selects no pixels
    pub fn new(
        time: Array1<f64>,
        flux: Array3<f64>,
        error: Option<Array3<f64>>,
        aperture: Option<Array2<u8>>,
    ) -> PipelineResult<Self> {
        let (ncads, rows, cols) = flux.dim();
        if time.len() != ncads {
            return Err(PipelineError::length_mismatch("time axis", ncads, time.len()));
        }

        let error = match error {
            Some(error) if error.dim() != flux.dim() => {
                return Err(PipelineError::shape_mismatch(
                    "error cube",
                    flux.dim(),
                    error.dim(),
                ));
            }
            Some(error) => error,
            None => Array3::zeros(flux.dim()),
        };

        let aperture = match aperture {
            Some(mask) => Aperture::for_shape(mask, (rows, cols))?,
            None => Aperture::full(rows, cols)?,
        };

        Ok(Self {
            time,
            flux,
            error,
            aperture,
            reduced: OnceLock::new(),
        })
    }

    /// Replace the aperture mask.
    ///
    /// On error the previous aperture and its cached series are kept.
    pub fn set_aperture(&mut self, mask: Array2<u8>) -> PipelineResult<()> {
        let aperture = Aperture::for_shape(mask, (self.nrows(), self.ncols()))?;
        self.install_aperture(aperture)
    }

    /// Replace the aperture with an already validated one.
    pub fn install_aperture(&mut self, aperture: Aperture) -> PipelineResult<()> {
        if aperture.dim() != (self.nrows(), self.ncols()) {
            return Err(PipelineError::shape_mismatch(
                "aperture mask",
                (self.nrows(), self.ncols()),
                aperture.dim(),
            ));
        }
        self.aperture = aperture;
        self.reduced = OnceLock::new();
        Ok(())
    }

    fn reduced(&self) -> &ApertureSeries {
        self.reduced.get_or_init(|| {
            ApertureSeries::compute(self.flux.view(), self.error.view(), &self.aperture)
        })
    }

    pub fn time(&self) -> ArrayView1<'_, f64> {
        self.time.view()
    }

    /// The `(N, rows, cols)` flux cube.
    pub fn flux_cube(&self) -> ArrayView3<'_, f64> {
        self.flux.view()
    }

    /// The `(N, rows, cols)` error cube.
    pub fn error_cube(&self) -> ArrayView3<'_, f64> {
        self.error.view()
    }

    pub fn aperture(&self) -> &Aperture {
        &self.aperture
    }

    /// Aperture pixel fluxes, shape `(N, npix)`.
    pub fn pixel_flux(&self) -> ArrayView2<'_, f64> {
        self.reduced().flux2d.view()
    }

    /// Aperture pixel errors, shape `(N, npix)`.
    pub fn pixel_error(&self) -> ArrayView2<'_, f64> {
        self.reduced().error2d.view()
    }

    /// Simple aperture photometry (SAP) flux, length `N`.
    pub fn flux(&self) -> ArrayView1<'_, f64> {
        self.reduced().flux.view()
    }

    /// SAP flux error, length `N`.
    pub fn error(&self) -> ArrayView1<'_, f64> {
        self.reduced().error.view()
    }

    /// Number of cadences.
    pub fn ncads(&self) -> usize {
        self.flux.len_of(Axis(0))
    }

    pub fn nrows(&self) -> usize {
        self.flux.len_of(Axis(1))
    }

    pub fn ncols(&self) -> usize {
        self.flux.len_of(Axis(2))
    }

    /// Number of pixels in the aperture.
    pub fn npix(&self) -> usize {
        self.aperture.npix()
    }
}

impl fmt::Display for PixelStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cadences on a {} x {} pixel postage stamp ({} in aperture)",
            self.ncads(),
            self.nrows(),
            self.ncols(),
            self.npix()
        )
    }
}
