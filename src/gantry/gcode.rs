// G-code driver for the gantry motion controller
//
// One command per line, terminated with CRLF. The controller answers each
// command with a line containing "ok" once the move has finished.
//
// Axis mapping: X = lateral, Z = vertical, Y = arm joint (0.1 units per degree)

use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::GantryActuator;
use crate::config::{
    ARM_FEEDRATE, ARM_HOME_DEG, ARM_UNITS_PER_DEG, HOME_ACK_TIMEOUT, MOVE_ACK_TIMEOUT,
    XZ_FEEDRATE,
};
use crate::link::{LineLink, LinkError, SerialLink};

const GCODE_TERMINATOR: &str = "\r\n";
const ACK: &str = "ok";

const DISABLE_STEPPERS: &str = "M18";
const ZERO_ARM: &str = "G92 Y0";
const HOME_XZ: &str = "G28 X Z";

#[derive(Debug, thiserror::Error)]
pub enum GantryError {
    #[error("Gantry link error: {0}")]
    Link(#[from] LinkError),

    #[error("No acknowledgement for {command:?} within {timeout:?}")]
    AckTimeout { command: String, timeout: Duration },
}

pub type Result<T> = std::result::Result<T, GantryError>;

fn move_xz_line(lateral_mm: f64, vertical_mm: f64) -> String {
    format!(
        "G0 X{:.2} Z{:.2} F{}",
        lateral_mm, vertical_mm, XZ_FEEDRATE
    )
}

fn move_arm_line(deg: f64) -> String {
    format!("G0 Y{:.2} F{}", deg * ARM_UNITS_PER_DEG, ARM_FEEDRATE)
}

/// Motion controller on a serial port
pub struct GcodeGantry<T: Read + Write = Box<dyn SerialPort>> {
    link: SerialLink<T>,
}

impl GcodeGantry {
    /// Open the motion controller's serial port
    pub fn open(port_name: &str) -> Result<Self> {
        info!("Opening gantry controller on {}", port_name);
        let link = SerialLink::open("gantry", port_name)?;
        Ok(Self::new(link))
    }
}

impl<T: Read + Write> GcodeGantry<T> {
    pub fn new(link: SerialLink<T>) -> Self {
        Self {
            link: link.with_terminator(GCODE_TERMINATOR),
        }
    }

    /// Send one command and block until the controller acknowledges it
    pub fn command(&mut self, line: &str, timeout: Duration) -> Result<()> {
        self.link.send(line)?;
        let deadline = Instant::now() + timeout;

        loop {
            for reply in self.link.poll_lines()? {
                debug!("gantry: {}", reply);
                if reply.contains(ACK) {
                    return Ok(());
                }
            }

            if Instant::now() >= deadline {
                return Err(GantryError::AckTimeout {
                    command: line.to_string(),
                    timeout,
                });
            }
        }
    }

    fn disable_steppers(&mut self) -> Result<()> {
        self.command(DISABLE_STEPPERS, MOVE_ACK_TIMEOUT)
    }
}

impl<T: Read + Write> GantryActuator for GcodeGantry<T> {
    fn move_lateral_vertical(&mut self, lateral_mm: f64, vertical_mm: f64) -> Result<()> {
        info!("Moving gantry to X={:.2} Z={:.2}", lateral_mm, vertical_mm);
        self.command(&move_xz_line(lateral_mm, vertical_mm), MOVE_ACK_TIMEOUT)
    }

    fn rotate_arm(&mut self, deg: f64) -> Result<()> {
        info!("Rotating arm to {:.2} deg", deg);
        self.command(&move_arm_line(deg), MOVE_ACK_TIMEOUT)?;
        self.disable_steppers()
    }

    fn home_arm(&mut self) -> Result<()> {
        info!("Homing arm");
        self.command(&move_arm_line(ARM_HOME_DEG), HOME_ACK_TIMEOUT)?;
        self.disable_steppers()?;
        self.command(ZERO_ARM, MOVE_ACK_TIMEOUT)
    }

    fn home_xz(&mut self) -> Result<()> {
        info!("Homing XZ");
        self.command(HOME_XZ, HOME_ACK_TIMEOUT)
    }
}

impl<T: Read + Write> Drop for GcodeGantry<T> {
    fn drop(&mut self) {
        // Release the steppers; nobody is left to wait for the ack
        if let Err(e) = self.link.send(DISABLE_STEPPERS) {
            warn!("Failed to release steppers on drop: {}", e);
        }
    }
}
