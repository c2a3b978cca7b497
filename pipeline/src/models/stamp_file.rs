//! Serialized form of a pixel stamp.
//!
//! Cubes are stored flattened in row-major `(cadence, row, col)` order next to
//! their shape. JSON has no NaN, so missing samples are written as `null` and
//! read back as NaN.

use ndarray::{Array1, Array2, Array3};
use serde::{Deserialize, Serialize};

use super::ids::Season;
use super::stamp::PixelStamp;
use crate::error::{PipelineError, PipelineResult};

/// On-disk representation of a [`PixelStamp`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StampFile {
    #[serde(with = "nan_as_null")]
    pub time: Vec<f64>,
    /// `[cadences, rows, cols]`
    pub shape: [usize; 3],
    #[serde(with = "nan_as_null")]
    pub flux: Vec<f64>,
    /// Empty when the source carried no uncertainties.
    #[serde(default, with = "nan_as_null", skip_serializing_if = "Vec::is_empty")]
    pub error: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aperture: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<Season>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude: Option<f64>,
}

mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(
            values
                .iter()
                .map(|v| if v.is_nan() { None } else { Some(*v) }),
        )
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let raw = Vec::<Option<f64>>::deserialize(deserializer)?;
        Ok(raw.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}

impl PixelStamp {
    /// Build a stamp from its serialized form.
    ///
    /// # Errors
    /// [`PipelineError::ShapeMismatch`] when a flattened array does not hold
    /// exactly the number of values its shape implies, or when the shape
    /// itself is too large to address.
    pub fn from_stamp_file(file: StampFile) -> PipelineResult<Self> {
        let [ncads, rows, cols] = file.shape;
        let shape = file.shape;
        let overflow = move || PipelineError::shape_mismatch("flux cube", "addressable size", shape);
        let frame_len = rows.checked_mul(cols).ok_or_else(overflow)?;
        let cube_len = ncads.checked_mul(frame_len).ok_or_else(overflow)?;

        if file.flux.len() != cube_len {
            return Err(PipelineError::length_mismatch("flux cube", cube_len, file.flux.len()));
        }
        let flux = Array3::from_shape_vec((ncads, rows, cols), file.flux)
            .map_err(|e| PipelineError::shape_mismatch("flux cube", file.shape, e.to_string()))?;

        let error = if file.error.is_empty() {
            None
        } else {
            if file.error.len() != cube_len {
                return Err(PipelineError::length_mismatch(
                    "error cube",
                    cube_len,
                    file.error.len(),
                ));
            }
            Some(
                Array3::from_shape_vec((ncads, rows, cols), file.error).map_err(|e| {
                    PipelineError::shape_mismatch("error cube", file.shape, e.to_string())
                })?,
            )
        };

        let aperture = match file.aperture {
            Some(mask) if mask.len() != frame_len => {
                return Err(PipelineError::length_mismatch(
                    "aperture mask",
                    frame_len,
                    mask.len(),
                ));
            }
            Some(mask) => Some(Array2::from_shape_vec((rows, cols), mask).map_err(|e| {
                PipelineError::shape_mismatch("aperture mask", (rows, cols), e.to_string())
            })?),
            None => None,
        };

        PixelStamp::new(Array1::from(file.time), flux, error, aperture)
    }

    /// Serialize this stamp, including its current aperture.
    pub fn to_stamp_file(&self) -> StampFile {
        StampFile {
            time: self.time().to_vec(),
            shape: [self.ncads(), self.nrows(), self.ncols()],
            flux: self.flux_cube().iter().copied().collect(),
            error: self.error_cube().iter().copied().collect(),
            aperture: Some(self.aperture().mask().iter().copied().collect()),
            season: None,
            magnitude: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file() -> StampFile {
        StampFile {
            time: vec![0.0, 0.5],
            shape: [2, 1, 2],
            flux: vec![1.0, 2.0, 3.0, f64::NAN],
            error: vec![],
            aperture: None,
            season: Some(Season::new(4)),
            magnitude: Some(12.5),
        }
    }

    #[test]
    fn test_nan_written_as_null() {
        let json = serde_json::to_string(&sample_file()).unwrap();
        assert!(json.contains("\"flux\":[1.0,2.0,3.0,null]"));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_null_read_as_nan() {
        let json = r#"{"time":[0.0,null],"shape":[2,1,1],"flux":[5.0,null]}"#;
        let file: StampFile = serde_json::from_str(json).unwrap();
        assert!(file.time[1].is_nan());
        assert!(file.flux[1].is_nan());
        assert!(file.error.is_empty());
        assert_eq!(file.season, None);
    }

    #[test]
    fn test_stamp_from_file_uses_row_major_order() {
        let stamp = PixelStamp::from_stamp_file(sample_file()).unwrap();
        assert_eq!(stamp.ncads(), 2);
        assert_eq!(stamp.nrows(), 1);
        assert_eq!(stamp.ncols(), 2);
        assert_eq!(stamp.flux_cube()[[1, 0, 0]], 3.0);
        // NaN pixel contributes nothing to the sum
        assert_eq!(stamp.flux().to_vec(), vec![3.0, 3.0]);
        assert_eq!(stamp.error().to_vec(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_wrong_flux_length_rejected() {
        let mut file = sample_file();
        file.flux.pop();
        let err = PixelStamp::from_stamp_file(file).unwrap_err();
        assert!(matches!(err, PipelineError::ShapeMismatch { what: "flux cube", .. }));
    }

    #[test]
    fn test_overflowing_shape_rejected() {
        let mut file = sample_file();
        file.shape = [usize::MAX, 2, 1];
        file.flux = vec![];
        let err = PixelStamp::from_stamp_file(file).unwrap_err();
        assert!(matches!(err, PipelineError::ShapeMismatch { what: "flux cube", .. }));

        let mut file = sample_file();
        file.shape = [1, usize::MAX, 2];
        assert!(PixelStamp::from_stamp_file(file).is_err());
    }

    #[test]
    fn test_wrong_aperture_length_rejected() {
        let mut file = sample_file();
        file.aperture = Some(vec![1, 1, 1]);
        assert!(PixelStamp::from_stamp_file(file).is_err());
    }

    #[test]
    fn test_to_stamp_file_keeps_aperture() {
        let mut file = sample_file();
        file.aperture = Some(vec![0, 1]);
        let stamp = PixelStamp::from_stamp_file(file).unwrap();
        let written = stamp.to_stamp_file();
        assert_eq!(written.aperture, Some(vec![0, 1]));
        assert_eq!(written.shape, [2, 1, 2]);
        assert_eq!(written.error, vec![0.0; 4]);
    }
}
