//! Mission capability trait.
//!
//! A mission (a telescope and its data products) supplies everything the
//! pipeline needs that depends on the observatory: where raw stamps come
//! from, how the default aperture is chosen, the cadence, how identifiers are
//! displayed and how the report page is laid out. The core never names a
//! specific observatory.

pub mod k2;

use ndarray::Array2;
use qtty::Seconds;

use crate::models::{PixelStamp, Season, TargetId};
use crate::report::ReportRoles;

/// Raw data returned by [`Mission::acquire_raw`].
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub stamp: PixelStamp,
    /// The season the stamp was taken from.
    pub season: Season,
    /// Apparent magnitude in the mission's band, when the archive knows it.
    pub magnitude: Option<f64>,
}

/// Capability set a concrete mission implements.
///
/// Every method is required. Errors are reported through [`Mission::Error`]
/// and reach the caller unchanged.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` so one mission can serve targets
/// processed in parallel.
pub trait Mission: Send + Sync {
    /// Mission-specific failure type.
    type Error: std::error::Error + Send + Sync + 'static;

    // ==================== Identity ====================

    /// Short mission name, e.g. `"K2"`.
    fn name(&self) -> &str;

    /// Display string for a target identifier, e.g. `"EPIC 205071984"`.
    fn format_identifier(&self, id: &TargetId) -> String;

    /// Label of the time axis.
    fn time_unit(&self) -> &str;

    /// Photometric band of reported magnitudes.
    fn magnitude_band(&self) -> &str;

    // ==================== Data ====================

    /// Retrieve the raw pixel stamp of a target.
    ///
    /// # Arguments
    /// * `id` - The target identifier
    /// * `season` - Season to read; `None` lets the mission pick one
    ///
    /// # Returns
    /// * `Ok(Acquisition)` - The stamp and the season it belongs to
    /// * `Err(Self::Error)` - If the target cannot be found or read
    fn acquire_raw(&self, id: &TargetId, season: Option<Season>)
        -> Result<Acquisition, Self::Error>;

    /// Choose the default aperture mask for a stamp.
    ///
    /// The returned mask is validated by the caller: it must match the stamp
    /// shape and select at least one pixel.
    fn select_aperture(&self, stamp: &PixelStamp) -> Result<Array2<u8>, Self::Error>;

    /// Cadence used when a target does not override it.
    fn default_cadence(&self) -> Seconds;

    // ==================== Report ====================

    /// Textual grid of the report page, one row per line.
    fn layout_spec(&self) -> String;

    /// Cell ids of the designated report roles in [`Mission::layout_spec`].
    fn report_roles(&self) -> ReportRoles;
}

impl<M: Mission + ?Sized> Mission for std::sync::Arc<M> {
    type Error = M::Error;

    fn name(&self) -> &str {
        (**self).name()
    }

    fn format_identifier(&self, id: &TargetId) -> String {
        (**self).format_identifier(id)
    }

    fn time_unit(&self) -> &str {
        (**self).time_unit()
    }

    fn magnitude_band(&self) -> &str {
        (**self).magnitude_band()
    }

    fn acquire_raw(
        &self,
        id: &TargetId,
        season: Option<Season>,
    ) -> Result<Acquisition, Self::Error> {
        (**self).acquire_raw(id, season)
    }

    fn select_aperture(&self, stamp: &PixelStamp) -> Result<Array2<u8>, Self::Error> {
        (**self).select_aperture(stamp)
    }

    fn default_cadence(&self) -> Seconds {
        (**self).default_cadence()
    }

    fn layout_spec(&self) -> String {
        (**self).layout_spec()
    }

    fn report_roles(&self) -> ReportRoles {
        (**self).report_roles()
    }
}
