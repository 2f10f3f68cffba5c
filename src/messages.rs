// Message types crossing the serial links and the zenoh session

use serde::{Deserialize, Serialize};

/// Locker body state, as tracked by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockerState {
    Vacant,
    Loading,
    Closed,
    MarkerAcquisition,
    Charging,
    Unlocked,
    Unloading,
    Empty,
    UnlockedEmergency,
}

impl LockerState {
    /// Parse a state name pushed by the LV controller.
    ///
    /// `MarkerAcquisition` is owned by the coordinator and `UnlockedEmergency`
    /// arrives as its own message, so neither is accepted here.
    pub fn from_peripheral(name: &str) -> Option<Self> {
        match name {
            "Vacant" => Some(Self::Vacant),
            "Loading" => Some(Self::Loading),
            "Closed" => Some(Self::Closed),
            "Charging" => Some(Self::Charging),
            "Unlocked" => Some(Self::Unlocked),
            "Unloading" => Some(Self::Unloading),
            "Empty" => Some(Self::Empty),
            _ => None,
        }
    }
}

/// Inbound line from the LV controller, decoded at the link boundary
#[derive(Debug, Clone, PartialEq)]
pub enum LvMessage {
    /// Authoritative state push
    State(LockerState),
    /// Bike is in and door closed: start docking
    CompVision,
    /// Rider wants the bike back: stop charging and undock
    WaitForFinish,
    /// Emergency unlock override
    EmergencyUnlock,
    Unknown(String),
}

impl LvMessage {
    pub fn decode(token: &str) -> Self {
        let token = token.trim();
        match token {
            "COMPVISION" => Self::CompVision,
            "WaitForFinish" => Self::WaitForFinish,
            "UnlockedEmergency" => Self::EmergencyUnlock,
            other => match LockerState::from_peripheral(other) {
                Some(state) => Self::State(state),
                None => Self::Unknown(other.to_string()),
            },
        }
    }
}

/// Outbound tokens to the LV controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LvCommand {
    ToCharging,
    ToUnlocked,
}

impl LvCommand {
    pub fn token(self) -> &'static str {
        match self {
            Self::ToCharging => "to_charging",
            Self::ToUnlocked => "to_unlocked",
        }
    }
}

/// Outbound tokens to the WPT controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WptCommand {
    StartCharging,
    StopCharging,
}

impl WptCommand {
    pub fn token(self) -> &'static str {
        match self {
            Self::StartCharging => "startCharging",
            Self::StopCharging => "stopCharging",
        }
    }
}

/// Gantry position at the most recent successful dock
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DockPosition {
    pub lateral_mm: f64,
    pub vertical_mm: f64,
}

/// Status published by the runtime after every state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockerStatus {
    pub state: LockerState,
    pub last_dock: Option<DockPosition>,
    pub acquisition_failures: u32,
}

/// One pose-estimated marker from the vision process -> runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerDetection {
    pub id: i32,
    /// Translation camera -> marker in metres (x right, y down, z depth)
    pub tvec_m: [f64; 3],
}
