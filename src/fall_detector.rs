use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::MasterConfig;
use crate::types::{AlertRecord, FusedReading};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum FallPhase {
    Idle,
    /// Rapid transition to LYING seen at `since`; waiting for confirmation.
    PotentialFall { since: u64 },
}

/// Two-phase fall detector over fused readings.
///
/// A fall is a rapid transition into LYING followed by LYING persisting for the
/// confirmation period. Exactly one alert per confirmed fall.
pub struct FallDetector {
    phase: FallPhase,
    previous: Option<FusedReading>,
    transition_max_ms: u64,
    confirmation_ms: u64,
}

impl FallDetector {
    pub fn new(transition_max_ms: u64, confirmation_ms: u64) -> Self {
        Self {
            phase: FallPhase::Idle,
            previous: None,
            transition_max_ms,
            confirmation_ms,
        }
    }

    pub fn from_config(config: &MasterConfig) -> Self {
        Self::new(config.fall_transition_max_ms, config.lying_confirmation_ms)
    }

    pub fn phase(&self) -> FallPhase {
        self.phase
    }

    pub fn process(&mut self, current: &FusedReading) -> Option<AlertRecord> {
        let mut alert = None;

        if let Some(prev) = &self.previous {
            if prev.final_posture.is_upright_or_active() && current.final_posture.is_lying() {
                // Backwards clocks never count as a rapid transition.
                match current.timestamp.checked_sub(prev.timestamp) {
                    Some(dt) if dt < self.transition_max_ms => {
                        warn!(
                            "Potential fall: {} -> LYING in {} ms",
                            prev.final_posture, dt
                        );
                        self.phase = FallPhase::PotentialFall {
                            since: current.timestamp,
                        };
                    }
                    Some(dt) => {
                        info!("Transition to LYING too slow ({} ms), ignored", dt);
                    }
                    None => {
                        warn!(
                            "Timestamp went backwards ({} -> {}), transition ignored",
                            prev.timestamp, current.timestamp
                        );
                    }
                }
            }
        }

        if let FallPhase::PotentialFall { since } = self.phase {
            if current.final_posture.is_lying() {
                let lying_ms = current.timestamp.checked_sub(since).unwrap_or(0);
                if lying_ms >= self.confirmation_ms {
                    let record = AlertRecord::fall_detected(current);
                    warn!("Fall confirmed after {} ms lying: {}", lying_ms, record.description);
                    alert = Some(record);
                    self.phase = FallPhase::Idle;
                }
            } else {
                info!(
                    "Potential fall cancelled, posture now {}",
                    current.final_posture
                );
                self.phase = FallPhase::Idle;
            }
        }

        self.previous = Some(current.clone());
        alert
    }
}
