// Target acquisition: sample the marker a fixed number of times and average
//
// Each axis keeps its own sample list. A solver output only counts towards an
// axis when that component is positive; a non-positive value is treated as a
// failed solve for that axis alone.
// NOTE: this also throws away legitimately non-positive targets. Kept as is
// until the solver reports failure explicitly per axis.

use std::fmt;
use tracing::{debug, info};

use crate::gantry::{ArmGeometry, MotionCommand, solve_with_geometry};
use crate::vision::MarkerPoseSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Lateral,
    Vertical,
    Arm,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lateral => "lateral",
            Self::Vertical => "vertical",
            Self::Arm => "arm",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AcquisitionError {
    #[error("No valid {axis} sample in {attempts} attempts")]
    NoValidSamples { axis: Axis, attempts: usize },
}

/// Per-axis mean over the valid samples of one acquisition run.
///
/// An axis with no valid samples holds NaN; use [`AggregateCommand::command`]
/// to get something safe to send to the gantry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateCommand {
    pub lateral_mm: f64,
    pub vertical_mm: f64,
    pub arm_deg: f64,
    /// Valid samples per axis: [lateral, vertical, arm]
    pub samples: [usize; 3],
    pub attempts: usize,
}

impl AggregateCommand {
    pub fn is_valid(&self) -> bool {
        self.command().is_ok()
    }

    pub fn command(&self) -> Result<MotionCommand, AcquisitionError> {
        let axes = [
            (Axis::Lateral, self.lateral_mm),
            (Axis::Vertical, self.vertical_mm),
            (Axis::Arm, self.arm_deg),
        ];
        if let Some(&(axis, _)) = axes.iter().find(|(_, value)| value.is_nan()) {
            return Err(AcquisitionError::NoValidSamples {
                axis,
                attempts: self.attempts,
            });
        }

        Ok(MotionCommand {
            lateral_mm: self.lateral_mm,
            vertical_mm: self.vertical_mm,
            arm_deg: self.arm_deg,
        })
    }
}

/// Mean of the samples, NaN when there are none
fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return f64::NAN;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Run `attempts` independent sampling rounds and average the results.
/// No retries past `attempts`: this bounds how long a dock can take.
pub fn acquire<P: MarkerPoseSource + ?Sized>(
    source: &mut P,
    geometry: &ArmGeometry,
    attempts: usize,
) -> AggregateCommand {
    let mut lateral = Vec::with_capacity(attempts);
    let mut vertical = Vec::with_capacity(attempts);
    let mut arm = Vec::with_capacity(attempts);

    for round in 0..attempts {
        let observation = source.detect();
        let Some(cmd) = solve_with_geometry(&observation, geometry) else {
            debug!("Round {}: no solution ({:?})", round, observation);
            continue;
        };

        debug!("Round {}: {:?}", round, cmd);
        if cmd.lateral_mm > 0.0 {
            lateral.push(cmd.lateral_mm);
        }
        if cmd.vertical_mm > 0.0 {
            vertical.push(cmd.vertical_mm);
        }
        if cmd.arm_deg > 0.0 {
            arm.push(cmd.arm_deg);
        }
    }

    let aggregate = AggregateCommand {
        lateral_mm: mean(&lateral),
        vertical_mm: mean(&vertical),
        arm_deg: mean(&arm),
        samples: [lateral.len(), vertical.len(), arm.len()],
        attempts,
    };
    info!(
        "Acquisition: lateral={:.2}mm vertical={:.2}mm arm={:.2}deg from {:?} of {} samples",
        aggregate.lateral_mm, aggregate.vertical_mm, aggregate.arm_deg, aggregate.samples, attempts
    );
    aggregate
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;

    use crate::vision::{InvalidReason, MarkerPoint, MarkerPoseSource, Observation};

    /// Plays back a fixed list of observations, then reports no marker
    #[derive(Default)]
    pub struct ScriptedPoseSource {
        pub observations: VecDeque<Observation>,
        pub detect_calls: usize,
        pub discards: usize,
    }

    impl ScriptedPoseSource {
        pub fn new(observations: Vec<Observation>) -> Self {
            Self {
                observations: observations.into(),
                ..Self::default()
            }
        }

        pub fn repeating(observation: Observation, n: usize) -> Self {
            Self::new(vec![observation; n])
        }
    }

    impl MarkerPoseSource for ScriptedPoseSource {
        fn detect(&mut self) -> Observation {
            self.detect_calls += 1;
            self.observations
                .pop_front()
                .unwrap_or(Observation::Invalid(InvalidReason::NoMarker))
        }

        fn discard_stale(&mut self) {
            self.discards += 1;
        }
    }

    pub fn seen(x_mm: f64, y_depth_mm: f64, z_vertical_mm: f64) -> Observation {
        Observation::Valid(MarkerPoint {
            x_mm,
            y_depth_mm,
            z_vertical_mm,
        })
    }
}
