// Gantry control for the charging pad
//
// Provides:
// - Camera-frame -> gantry-frame kinematic solver
// - G-code motion controller driver over a serial link
// - The actuator trait the coordinator drives

mod gcode;
pub mod kinematics;

pub use gcode::{GantryError, GcodeGantry};
pub use kinematics::{solve, solve_with_geometry, ArmGeometry, MotionCommand};

/// Blocking motion interface. Every call returns only after the motion
/// controller acknowledged the move (or failed).
pub trait GantryActuator {
    /// Absolute move in the XZ plane (mm)
    fn move_lateral_vertical(&mut self, lateral_mm: f64, vertical_mm: f64)
    -> Result<(), GantryError>;

    /// Absolute arm angle (degrees)
    fn rotate_arm(&mut self, deg: f64) -> Result<(), GantryError>;

    /// Drive the arm to its stop and re-zero it
    fn home_arm(&mut self) -> Result<(), GantryError>;

    /// Run the controller's XZ homing cycle
    fn home_xz(&mut self) -> Result<(), GantryError>;
}
