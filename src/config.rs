// Ports, timeouts, topics, locker geometry
use std::time::Duration;

// Serial ports (override on the command line)
pub const LV_PORT: &str = "/dev/ttyACM0"; // door/bike sensors
pub const WPT_PORT: &str = "/dev/ttyACM1"; // wireless power transmitter
pub const GANTRY_PORT: &str = "/dev/ttyUSB0"; // motion controller

pub const LINK_BAUDRATE: u32 = 115_200;

// Read timeout on every serial port. The coordinator blocks for at most this
// long waiting for LV traffic before looping again.
pub const LINK_READ_TIMEOUT: Duration = Duration::from_millis(100);

// How long the motion controller may take to answer "ok"
pub const MOVE_ACK_TIMEOUT: Duration = Duration::from_secs(30);
pub const HOME_ACK_TIMEOUT: Duration = Duration::from_secs(90);

// Feedrates (mm/min)
pub const XZ_FEEDRATE: u32 = 1200;
pub const ARM_FEEDRATE: u32 = 200;

// Arm joint: controller Y axis units per degree
pub const ARM_UNITS_PER_DEG: f64 = 0.1;
// Arm is driven slightly past zero against its stop before re-zeroing
pub const ARM_HOME_DEG: f64 = -1.0;

// Marker acquisition
pub const ACQUISITION_ATTEMPTS: usize = 30;
pub const EXPECTED_MARKER_ID: i32 = 0;
pub const FRAME_TIMEOUT: Duration = Duration::from_millis(500);

// Undock: lateral distance backed off from the dock position before homing
pub const RETRACT_CLEARANCE_MM: f64 = 100.0;

// Geometry (mm / degrees)
pub const CAM_X_OFFSET_MM: f64 = 480.0;
pub const CAM_Z_OFFSET_MM: f64 = 50.0;
pub const Y_MOUNTING_OFFSET_MM: f64 = 287.0;
pub const ARM_LENGTH_MM: f64 = 260.0;
pub const THETA_OFFSET_DEG: f64 = 0.0;

// Camera intrinsics written by the calibration tool
pub const CALIBRATION_PATH: &str = "camera_calibration/data/calibration.json";

// Zenoh topics
pub const TOPIC_VISION_MARKERS: &str = "locker/vision/markers"; // detections in
pub const TOPIC_VISION_CALIBRATION: &str = "locker/vision/calibration"; // intrinsics out
pub const TOPIC_STATUS: &str = "locker/state/status"; // locker status out

// Vision bridge poll rate
pub const VISION_POLL_HZ: u64 = 50;

/// Command-line overrides for the defaults above
#[derive(Debug, Clone, clap::Parser)]
#[command(version, about = "Bike locker docking runtime")]
pub struct Args {
    /// LV controller serial port
    #[arg(long, default_value = LV_PORT)]
    pub lv_port: String,

    /// WPT controller serial port
    #[arg(long, default_value = WPT_PORT)]
    pub wpt_port: String,

    /// Gantry motion controller serial port
    #[arg(long, default_value = GANTRY_PORT)]
    pub gantry_port: String,

    /// Camera calibration file (JSON)
    #[arg(long, default_value = CALIBRATION_PATH)]
    pub calibration: std::path::PathBuf,

    /// Marker ID printed on the bike
    #[arg(long, default_value_t = EXPECTED_MARKER_ID)]
    pub marker_id: i32,

    /// Sampling rounds per marker acquisition
    #[arg(long, default_value_t = ACQUISITION_ATTEMPTS)]
    pub attempts: usize,

    /// Do not publish locker status over zenoh
    #[arg(long)]
    pub no_telemetry: bool,
}
