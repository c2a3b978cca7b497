//! Data model for postage-stamp photometry.
//!
//! Data flows strictly downward: a [`PixelStamp`] reduces its pixel cube to an
//! aperture-summed raw series, a [`DetrendedSeries`] subtracts an additive model
//! from it, and a [`Lightcurve`] owns the pair.

pub mod aperture;
pub mod detrended;
pub mod ids;
pub mod lightcurve;
pub mod macros;
pub mod stamp;
pub mod stamp_file;


pub use aperture::Aperture;
pub use detrended::DetrendedSeries;
pub use ids::{Season, TargetId};
pub use lightcurve::Lightcurve;
pub use stamp::{aperture_photometry, aperture_sum, pixel_series, quadrature_sum, PixelStamp};
pub use stamp_file::StampFile;
