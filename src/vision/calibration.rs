// Camera intrinsics, written once by the calibration tool and read at startup

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    #[error("Cannot read calibration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed calibration file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid calibration: {0}")]
    Invalid(String),
}

/// Pinhole intrinsics plus lens distortion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraCalibration {
    /// [[fx, 0, cx], [0, fy, cy], [0, 0, 1]]
    pub camera_matrix: [[f64; 3]; 3],
    /// k1, k2, p1, p2[, k3, ...]
    pub dist_coeffs: Vec<f64>,
}

impl CameraCalibration {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CalibrationError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let calibration = Self::from_json(&text)?;
        info!(
            "Loaded camera calibration from {} (fx={:.1}, fy={:.1})",
            path.display(),
            calibration.camera_matrix[0][0],
            calibration.camera_matrix[1][1]
        );
        Ok(calibration)
    }

    pub fn from_json(text: &str) -> Result<Self, CalibrationError> {
        let calibration: Self = serde_json::from_str(text)?;
        calibration.validate()?;
        Ok(calibration)
    }

    fn validate(&self) -> Result<(), CalibrationError> {
        let m = &self.camera_matrix;
        if !(m[0][0] > 0.0 && m[1][1] > 0.0) {
            return Err(CalibrationError::Invalid(format!(
                "focal lengths must be positive, got fx={} fy={}",
                m[0][0], m[1][1]
            )));
        }
        if m[1][0] != 0.0 || m[2] != [0.0, 0.0, 1.0] {
            return Err(CalibrationError::Invalid(
                "camera matrix is not upper triangular with m[2][2] = 1".to_string(),
            ));
        }
        // The distortion models OpenCV knows about
        if ![4, 5, 8, 12, 14].contains(&self.dist_coeffs.len()) {
            return Err(CalibrationError::Invalid(format!(
                "unsupported number of distortion coefficients: {}",
                self.dist_coeffs.len()
            )));
        }
        Ok(())
    }
}
