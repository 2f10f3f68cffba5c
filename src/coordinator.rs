// Docking coordinator: the locker's top-level state machine
//
// Single control thread. The LV controller is the source of truth for body
// states and may resend them at any time; the coordinator only owns the
// docking and undocking sequences. Gantry moves block, and the LV link is
// checked between them so an emergency unlock can cut a sequence short.

use std::collections::VecDeque;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use crate::acquisition::acquire;
use crate::config::{ACQUISITION_ATTEMPTS, RETRACT_CLEARANCE_MM};
use crate::gantry::{ArmGeometry, GantryActuator, GantryError};
use crate::link::{LineLink, LinkError};
use crate::messages::{DockPosition, LockerState, LockerStatus, LvCommand, LvMessage, WptCommand};
use crate::vision::MarkerPoseSource;

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("LV link lost: {0}")]
    LvLink(#[source] LinkError),

    #[error("WPT link lost: {0}")]
    WptLink(#[source] LinkError),

    #[error("Gantry failure: {0}")]
    Gantry(#[from] GantryError),
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Everything the coordinator talks to. Dropping the session closes the
/// serial ports and releases the gantry.
pub struct LockerSession<L, W, G, P> {
    pub lv: L,
    pub wpt: W,
    pub gantry: G,
    pub vision: P,
}

/// How a blocking sequence ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sequence {
    Completed,
    Aborted,
}

pub struct DockingCoordinator<L, W, G, P> {
    session: LockerSession<L, W, G, P>,
    geometry: ArmGeometry,
    attempts: usize,
    state: LockerState,
    last_dock: Option<DockPosition>,
    acquisition_failures: u32,
    // Messages read but not yet handled, in arrival order
    pending: VecDeque<LvMessage>,
    status_tx: Option<UnboundedSender<LockerStatus>>,
}

impl<L, W, G, P> DockingCoordinator<L, W, G, P>
where
    L: LineLink,
    W: LineLink,
    G: GantryActuator,
    P: MarkerPoseSource,
{
    pub fn new(session: LockerSession<L, W, G, P>) -> Self {
        Self {
            session,
            geometry: ArmGeometry::default(),
            attempts: ACQUISITION_ATTEMPTS,
            state: LockerState::Empty,
            last_dock: None,
            acquisition_failures: 0,
            pending: VecDeque::new(),
            status_tx: None,
        }
    }

    pub fn with_geometry(mut self, geometry: ArmGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }

    /// Publish a status snapshot on every state change
    pub fn with_status_sink(mut self, tx: UnboundedSender<LockerStatus>) -> Self {
        self.status_tx = Some(tx);
        self
    }

    pub fn state(&self) -> LockerState {
        self.state
    }

    pub fn last_dock(&self) -> Option<DockPosition> {
        self.last_dock
    }

    pub fn status(&self) -> LockerStatus {
        LockerStatus {
            state: self.state,
            last_dock: self.last_dock,
            acquisition_failures: self.acquisition_failures,
        }
    }

    /// Home everything, then handle LV traffic until a link fails
    pub fn run(&mut self) -> Result<()> {
        self.startup()?;
        info!("Coordinator running in state {:?}", self.state);
        loop {
            self.poll()?;
        }
    }

    /// Put the gantry in a known position before taking any events
    pub fn startup(&mut self) -> Result<()> {
        info!("Homing gantry");
        self.session.gantry.home_arm()?;
        self.session.gantry.home_xz()?;
        self.publish_status();
        Ok(())
    }

    /// Read one batch from the LV link and handle everything queued.
    /// Blocks for at most the link's read timeout when the link is quiet.
    pub fn poll(&mut self) -> Result<()> {
        let lines = self.session.lv.poll_lines().map_err(CoordinatorError::LvLink)?;
        self.pending.extend(lines.iter().map(|line| LvMessage::decode(line)));

        while let Some(message) = self.pending.pop_front() {
            self.handle(message)?;
        }
        Ok(())
    }

    /// Apply one decoded LV message
    pub fn handle(&mut self, message: LvMessage) -> Result<()> {
        match (message, self.state) {
            (LvMessage::EmergencyUnlock, _) => {
                warn!("Emergency unlock from LV controller");
                self.set_state(LockerState::UnlockedEmergency);
            }
            (LvMessage::State(pushed), _) => self.set_state(pushed),
            (LvMessage::CompVision, LockerState::Closed) => self.dock()?,
            (LvMessage::WaitForFinish, LockerState::Charging) => self.undock()?,
            (LvMessage::Unknown(token), _) => debug!("Ignoring unknown token {:?}", token),
            (message, state) => debug!("Ignoring {:?} in state {:?}", message, state),
        }
        Ok(())
    }

    /// Find the marker, position the pad and start charging
    fn dock(&mut self) -> Result<()> {
        self.set_state(LockerState::MarkerAcquisition);

        self.session.vision.discard_stale();
        let aggregate = acquire(&mut self.session.vision, &self.geometry, self.attempts);
        let target = match aggregate.command() {
            Ok(target) => target,
            Err(e) => {
                self.acquisition_failures += 1;
                error!(
                    "Marker acquisition failed ({}), waiting for operator (failure #{})",
                    e, self.acquisition_failures
                );
                self.publish_status();
                return Ok(());
            }
        };

        self.session
            .gantry
            .move_lateral_vertical(target.lateral_mm, target.vertical_mm)?;
        if self.checkpoint()? == Sequence::Aborted {
            return Ok(());
        }

        self.session.gantry.rotate_arm(target.arm_deg)?;
        if self.checkpoint()? == Sequence::Aborted {
            return Ok(());
        }

        self.send_wpt(WptCommand::StartCharging)?;
        self.send_lv(LvCommand::ToCharging)?;
        self.last_dock = Some(DockPosition {
            lateral_mm: target.lateral_mm,
            vertical_mm: target.vertical_mm,
        });
        info!("Docked at {:?}", self.last_dock);
        self.set_state(LockerState::Charging);
        Ok(())
    }

    /// Stop charging, pull the pad out and release the bike
    fn undock(&mut self) -> Result<()> {
        self.send_wpt(WptCommand::StopCharging)?;

        match self.last_dock.take() {
            Some(dock) => {
                let retract_to = (dock.lateral_mm - RETRACT_CLEARANCE_MM).max(0.0);
                info!("Retracting from X={:.2} to X={:.2}", dock.lateral_mm, retract_to);
                self.session
                    .gantry
                    .move_lateral_vertical(retract_to, dock.vertical_mm)?;
                if self.checkpoint()? == Sequence::Aborted {
                    return Ok(());
                }
            }
            None => warn!("No dock position recorded, homing without retract"),
        }

        self.session.gantry.home_arm()?;
        if self.checkpoint()? == Sequence::Aborted {
            return Ok(());
        }

        self.session.gantry.home_xz()?;
        if self.checkpoint()? == Sequence::Aborted {
            return Ok(());
        }

        self.send_lv(LvCommand::ToUnlocked)?;
        self.set_state(LockerState::Unlocked);
        Ok(())
    }

    /// Between two blocking moves: read the LV link once. An emergency unlock
    /// ends the running sequence and supersedes everything read before it;
    /// anything else waits until the sequence is done.
    fn checkpoint(&mut self) -> Result<Sequence> {
        let lines = self.session.lv.poll_lines().map_err(CoordinatorError::LvLink)?;
        let mut messages: Vec<LvMessage> =
            lines.iter().map(|line| LvMessage::decode(line)).collect();

        let Some(emergency) = messages
            .iter()
            .position(|m| *m == LvMessage::EmergencyUnlock)
        else {
            self.pending.extend(messages);
            return Ok(Sequence::Completed);
        };

        let superseded = self.pending.len() + emergency;
        if superseded > 0 {
            debug!("Dropping {} messages older than the emergency unlock", superseded);
        }
        self.pending.clear();
        self.pending.extend(messages.drain(emergency + 1..));

        warn!("Emergency unlock during {:?}, aborting sequence", self.state);
        self.set_state(LockerState::UnlockedEmergency);
        Ok(Sequence::Aborted)
    }

    fn send_lv(&mut self, command: LvCommand) -> Result<()> {
        info!("LV <- {}", command.token());
        self.session
            .lv
            .send(command.token())
            .map_err(CoordinatorError::LvLink)
    }

    fn send_wpt(&mut self, command: WptCommand) -> Result<()> {
        info!("WPT <- {}", command.token());
        self.session
            .wpt
            .send(command.token())
            .map_err(CoordinatorError::WptLink)
    }

    fn set_state(&mut self, next: LockerState) {
        if next == self.state {
            return;
        }
        info!("State {:?} -> {:?}", self.state, next);
        self.state = next;
        self.publish_status();
    }

    fn publish_status(&self) {
        if let Some(tx) = &self.status_tx {
            if tx.send(self.status()).is_err() {
                debug!("Status receiver gone");
            }
        }
    }
}
