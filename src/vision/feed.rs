// Pose source fed by the vision bridge
//
// The runtime forwards every detection batch from the zenoh topic into a
// bounded channel; this end waits for the next frame with a timeout.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;
use tracing::{debug, warn};

use super::{InvalidReason, MarkerPoseSource, Observation, observation_from_detections};
use crate::messages::MarkerDetection;

pub struct FeedPoseSource {
    frames: Receiver<Vec<MarkerDetection>>,
    expected_id: i32,
    frame_timeout: Duration,
}

impl FeedPoseSource {
    pub fn new(
        frames: Receiver<Vec<MarkerDetection>>,
        expected_id: i32,
        frame_timeout: Duration,
    ) -> Self {
        Self {
            frames,
            expected_id,
            frame_timeout,
        }
    }
}

impl MarkerPoseSource for FeedPoseSource {
    fn detect(&mut self) -> Observation {
        match self.frames.recv_timeout(self.frame_timeout) {
            Ok(detections) => {
                let observation = observation_from_detections(&detections, self.expected_id);
                debug!("Frame with {} markers: {:?}", detections.len(), observation);
                observation
            }
            Err(RecvTimeoutError::Timeout) => {
                debug!("No frame within {:?}", self.frame_timeout);
                Observation::Invalid(InvalidReason::NoFrame)
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Vision feed disconnected");
                Observation::Invalid(InvalidReason::NoFrame)
            }
        }
    }

    fn discard_stale(&mut self) {
        let stale = self.frames.try_iter().count();
        if stale > 0 {
            debug!("Discarded {} stale frames", stale);
        }
    }
}
