//! Binary aperture masks.
//!
//! A pixel belongs to the aperture when the lowest bit of its mask value is
//! set (`mask & 1`), so masks carrying extra flag bits in higher positions are
//! accepted as-is. Selected pixels are always visited in row-major order, which
//! fixes the column order of every per-pixel series derived from a stamp.

use ndarray::{Array2, ArrayView2};

use crate::error::{PipelineError, PipelineResult};

/// A validated, non-empty aperture mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aperture {
    mask: Array2<u8>,
    pixels: Vec<(usize, usize)>,
}

impl Aperture {
    /// Build an aperture from a mask.
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidAperture`] if no pixel is selected.
    pub fn new(mask: Array2<u8>) -> PipelineResult<Self> {
        let pixels: Vec<(usize, usize)> = mask
            .indexed_iter()
            .filter(|(_, &value)| value & 1 != 0)
            .map(|(index, _)| index)
            .collect();

        if pixels.is_empty() {
            let (rows, cols) = mask.dim();
            return Err(PipelineError::invalid_aperture(format!(
                "{}x{} mask selects no pixels",
                rows, cols
            )));
        }

        Ok(Self { mask, pixels })
    }

    /// Aperture covering every pixel of a `rows x cols` stamp.
    pub fn full(rows: usize, cols: usize) -> PipelineResult<Self> {
        Self::new(Array2::ones((rows, cols)))
    }

    /// Build an aperture for a stamp of the given shape, rejecting masks of a
    /// different shape.
    pub fn for_shape(mask: Array2<u8>, shape: (usize, usize)) -> PipelineResult<Self> {
        if mask.dim() != shape {
            return Err(PipelineError::shape_mismatch(
                "aperture mask",
                shape,
                mask.dim(),
            ));
        }
        Self::new(mask)
    }

    pub fn mask(&self) -> ArrayView2<'_, u8> {
        self.mask.view()
    }

    /// Mask shape as `(rows, cols)`.
    pub fn dim(&self) -> (usize, usize) {
        self.mask.dim()
    }

    /// Number of selected pixels (always at least one).
    pub fn npix(&self) -> usize {
        self.pixels.len()
    }

    /// Selected `(row, col)` positions in row-major order.
    pub fn pixels(&self) -> &[(usize, usize)] {
        &self.pixels
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.mask
            .get((row, col))
            .map(|value| value & 1 != 0)
            .unwrap_or(false)
    }

    pub fn into_mask(self) -> Array2<u8> {
        self.mask
    }
}
