// Camera -> gantry kinematics for the charging arm
// Converts a marker position seen by the camera into an XZ move plus an arm angle.
//
// Axis naming follows the gantry: camera depth is called "y" (the arm swings
// into it) and camera vertical is called "z" (the gantry's vertical axis).

use crate::config::{
    ARM_LENGTH_MM, CAM_X_OFFSET_MM, CAM_Z_OFFSET_MM, THETA_OFFSET_DEG, Y_MOUNTING_OFFSET_MM,
};
use crate::vision::Observation;

/// Fixed geometry of the gantry, arm and camera mount
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmGeometry {
    pub cam_x_offset_mm: f64,
    pub cam_z_offset_mm: f64,
    pub y_mounting_offset_mm: f64,
    pub arm_length_mm: f64,
    pub theta_offset_deg: f64,
}

impl Default for ArmGeometry {
    fn default() -> Self {
        Self {
            cam_x_offset_mm: CAM_X_OFFSET_MM,
            cam_z_offset_mm: CAM_Z_OFFSET_MM,
            y_mounting_offset_mm: Y_MOUNTING_OFFSET_MM,
            arm_length_mm: ARM_LENGTH_MM,
            theta_offset_deg: THETA_OFFSET_DEG,
        }
    }
}

/// Gantry-frame target for one observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionCommand {
    pub lateral_mm: f64,
    pub vertical_mm: f64,
    pub arm_deg: f64,
}

/// Solve with the installed geometry.
///
/// Returns `None` when the marker is out of the arm's reach or the
/// observation is invalid. Both are routine (noisy or missing detections),
/// not errors.
pub fn solve(observation: &Observation) -> Option<MotionCommand> {
    solve_with_geometry(observation, &ArmGeometry::default())
}

pub fn solve_with_geometry(
    observation: &Observation,
    geometry: &ArmGeometry,
) -> Option<MotionCommand> {
    let point = observation.point()?;

    // How far the arm has to swing into the depth axis
    let arm_offset = point.y_depth_mm - geometry.y_mounting_offset_mm;
    if arm_offset > geometry.arm_length_mm || arm_offset < -geometry.arm_length_mm {
        return None;
    }

    let ratio = arm_offset / geometry.arm_length_mm;
    let arm_deg = ratio.asin().to_degrees() - geometry.theta_offset_deg;

    // Lateral reach the arm uses up at that angle
    let x_arm = (geometry.arm_length_mm.powi(2) - arm_offset.powi(2)).sqrt();

    Some(MotionCommand {
        lateral_mm: geometry.cam_x_offset_mm - point.x_mm - x_arm,
        vertical_mm: geometry.cam_z_offset_mm + point.z_vertical_mm,
        arm_deg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::{InvalidReason, MarkerPoint};

    fn geometry() -> ArmGeometry {
        ArmGeometry {
            cam_x_offset_mm: 480.0,
            cam_z_offset_mm: 50.0,
            y_mounting_offset_mm: 287.0,
            arm_length_mm: 260.0,
            theta_offset_deg: 0.0,
        }
    }

    fn seen(x: f64, y_depth: f64, z_vertical: f64) -> Observation {
        Observation::Valid(MarkerPoint {
            x_mm: x,
            y_depth_mm: y_depth,
            z_vertical_mm: z_vertical,
        })
    }

    #[test]
    fn test_reference_observation() {
        // x=100, depth=300, vertical=20 -> arm_offset = 13
        let cmd = solve_with_geometry(&seen(100.0, 300.0, 20.0), &geometry()).unwrap();

        let x_arm = (260.0f64 * 260.0 - 13.0 * 13.0).sqrt();
        assert!((x_arm - 259.675).abs() < 1e-3);
        assert!((cmd.arm_deg - 2.866).abs() < 1e-3, "arm_deg={}", cmd.arm_deg);
        assert!((cmd.lateral_mm - (480.0 - 100.0 - x_arm)).abs() < 1e-9);
        assert!((cmd.vertical_mm - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_installed_geometry() {
        // The locker's own constants: same answer as the explicit geometry
        assert_eq!(ArmGeometry::default(), geometry());
        assert_eq!(
            solve(&seen(100.0, 300.0, 20.0)),
            solve_with_geometry(&seen(100.0, 300.0, 20.0), &geometry())
        );
    }

    #[test]
    fn test_theta_offset_subtracted() {
        let mut g = geometry();
        g.theta_offset_deg = 1.5;
        let cmd = solve_with_geometry(&seen(100.0, 300.0, 20.0), &g).unwrap();
        let reference = solve_with_geometry(&seen(100.0, 300.0, 20.0), &geometry()).unwrap();
        assert!((reference.arm_deg - cmd.arm_deg - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_beyond_reach_is_unreachable() {
        // arm_offset = 287 + 261 - 287 = 261 > 260
        assert_eq!(solve_with_geometry(&seen(0.0, 548.0, 0.0), &geometry()), None);
        // Far too close to the camera
        assert_eq!(solve_with_geometry(&seen(0.0, 0.0, 0.0), &geometry()), None);
    }

    #[test]
    fn test_full_reach_is_solvable() {
        // arm_offset exactly equal to the arm length: arm straight out
        let cmd = solve_with_geometry(&seen(0.0, 547.0, 0.0), &geometry()).unwrap();
        assert!((cmd.arm_deg - 90.0).abs() < 1e-9);
        assert!((cmd.lateral_mm - 480.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_observation_is_unreachable() {
        let invalid = Observation::Invalid(InvalidReason::MultipleMarkers(2));
        assert_eq!(solve_with_geometry(&invalid, &geometry()), None);
    }

    #[test]
    fn test_deterministic() {
        let obs = seen(42.0, 310.5, -7.25);
        let a = solve_with_geometry(&obs, &geometry());
        let b = solve_with_geometry(&obs, &geometry());
        assert_eq!(a, b);
        assert!(a.is_some());
    }

    #[test]
    fn test_never_nan_across_depths() {
        // Sweep well past both ends of the reach; a solution must never be NaN
        let g = geometry();
        for depth in (0..1000).map(|d| d as f64) {
            if let Some(cmd) = solve_with_geometry(&seen(10.0, depth, 5.0), &g) {
                assert!(cmd.arm_deg.is_finite(), "NaN arm angle at depth {}", depth);
                assert!(cmd.lateral_mm.is_finite());
            }
        }
    }
}
