// Marker observations for the docking arm
//
// The detector process does the image work (marker decoding and pose
// estimation) and publishes one batch of detections per camera frame. This
// module turns a batch into a single observation the solver can use.

mod calibration;
mod feed;

pub use calibration::{CalibrationError, CameraCalibration};
pub use feed::FeedPoseSource;

use crate::messages::MarkerDetection;

/// Marker position in millimetres, named in gantry terms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerPoint {
    /// Camera x (right)
    pub x_mm: f64,
    /// Camera depth (the direction the arm swings into)
    pub y_depth_mm: f64,
    /// Camera vertical
    pub z_vertical_mm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    NoFrame,
    NoMarker,
    WrongId(i32),
    MultipleMarkers(usize),
}

/// Result of looking at one camera frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    Valid(MarkerPoint),
    Invalid(InvalidReason),
}

impl Observation {
    pub fn point(&self) -> Option<&MarkerPoint> {
        match self {
            Self::Valid(point) => Some(point),
            Self::Invalid(_) => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.point().is_some()
    }
}

/// Something that can look for the bike's marker
pub trait MarkerPoseSource {
    /// Capture one frame and report what was seen
    fn detect(&mut self) -> Observation;

    /// Drop frames captured before now
    fn discard_stale(&mut self) {}
}

/// Reduce one frame's detections to an observation.
///
/// Only a frame holding exactly one marker with the expected ID counts. A
/// second marker in view makes the pose ambiguous, and a foreign ID may be a
/// neighbouring bike or a spoof, so both are rejected.
pub fn observation_from_detections(
    detections: &[MarkerDetection],
    expected_id: i32,
) -> Observation {
    match detections {
        [] => Observation::Invalid(InvalidReason::NoMarker),
        [only] if only.id != expected_id => Observation::Invalid(InvalidReason::WrongId(only.id)),
        [only] => {
            let [x, y, z] = only.tvec_m;
            Observation::Valid(MarkerPoint {
                x_mm: x * 1000.0,
                y_depth_mm: z * 1000.0,
                z_vertical_mm: y * 1000.0,
            })
        }
        many => Observation::Invalid(InvalidReason::MultipleMarkers(many.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(id: i32, tvec_m: [f64; 3]) -> MarkerDetection {
        MarkerDetection { id, tvec_m }
    }

    #[test]
    fn test_single_expected_marker() {
        let obs = observation_from_detections(&[marker(0, [0.1, 0.02, 0.3])], 0);
        let point = obs.point().expect("observation should be valid");
        assert!((point.x_mm - 100.0).abs() < 1e-9);
        // Camera depth becomes the arm axis, camera y the vertical axis
        assert!((point.y_depth_mm - 300.0).abs() < 1e-9);
        assert!((point.z_vertical_mm - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_marker() {
        assert_eq!(
            observation_from_detections(&[], 0),
            Observation::Invalid(InvalidReason::NoMarker)
        );
    }

    #[test]
    fn test_wrong_id_rejected() {
        assert_eq!(
            observation_from_detections(&[marker(7, [0.1, 0.0, 0.3])], 0),
            Observation::Invalid(InvalidReason::WrongId(7))
        );
    }

    #[test]
    fn test_second_marker_rejected_even_with_expected_id() {
        let frame = [marker(0, [0.1, 0.0, 0.3]), marker(3, [0.2, 0.0, 0.3])];
        assert_eq!(
            observation_from_detections(&frame, 0),
            Observation::Invalid(InvalidReason::MultipleMarkers(2))
        );
    }
}
