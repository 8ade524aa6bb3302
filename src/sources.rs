use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{error::TrySendError, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, Instant};

use crate::config::ModuleAnchor;
use crate::decoder::NodePayload;
use crate::pipeline::MasterHandle;
use crate::types::{Posture, RoomPoint, SensorReading};

/// Radar cycle of a node.
pub const NODE_PERIOD_MS: u64 = 100;

/// Scripted behaviour of the simulated occupant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Scenario {
    /// Walks, drops to the floor at 5 s and stays down.
    Fall,
    /// Drops at 5 s but gets up again after 3 s.
    Stumble,
    /// Moves around, sits, stands. Never lies down.
    Calm,
}

impl Scenario {
    pub fn posture_at(&self, t_ms: u64) -> Posture {
        match self {
            Scenario::Fall => match t_ms {
                0..=2_999 => Posture::Moving,
                3_000..=4_999 => Posture::Standing,
                _ => Posture::Lying,
            },
            Scenario::Stumble => match t_ms {
                0..=4_999 => Posture::Standing,
                5_000..=7_999 => Posture::Lying,
                _ => Posture::Standing,
            },
            Scenario::Calm => match (t_ms / 4_000) % 4 {
                0 => Posture::Moving,
                1 => Posture::Standing,
                2 => Posture::Sitting,
                _ => Posture::Still,
            },
        }
    }

    /// Where the occupant is, in the room frame.
    pub fn target_at(&self, t_ms: u64) -> RoomPoint {
        let t = t_ms as f64 / 1000.0;
        match self.posture_at(t_ms) {
            Posture::Moving => RoomPoint::new(1.5 + 0.8 * (t * 0.5).sin(), 2.0 + 0.5 * (t * 0.3).cos()),
            _ => RoomPoint::new(1.5, 2.2),
        }
    }
}

/// Synthesize one node reading. Range jitter is deterministic so runs repeat.
pub fn simulated_reading(
    scenario: Scenario,
    anchor: &ModuleAnchor,
    t_ms: u64,
    skew_ms: u64,
) -> SensorReading {
    let target = scenario.target_at(t_ms);
    let jitter = 0.02 * ((t_ms as f64 / 137.0) + anchor.id as f64).sin();
    let distance = ((target - anchor.position()).norm() + jitter).max(0.0);
    let signal = 60 + ((t_ms / NODE_PERIOD_MS + anchor.id as u64) % 30) as i32;
    SensorReading {
        module_id: anchor.id,
        timestamp: t_ms + skew_ms,
        distance_m: distance,
        posture: scenario.posture_at(t_ms),
        signal,
    }
}

/// One simulated radar node publishing JSON payloads every radar cycle.
pub async fn node_loop(anchor: ModuleAnchor, scenario: Scenario, skew_ms: u64, tx: Sender<Vec<u8>>) {
    let mut ticker = interval(Duration::from_millis(NODE_PERIOD_MS));
    let start = Instant::now();
    let mut published = 0u64;

    loop {
        ticker.tick().await;
        let t_ms = start.elapsed().as_millis() as u64;
        let reading = simulated_reading(scenario, &anchor, t_ms, skew_ms);
        let payload = NodePayload::from_reading(&reading).to_json().into_bytes();

        match tx.try_send(payload) {
            Ok(_) => {
                published += 1;
                if published % 100 == 0 {
                    debug!("[node {}] {} payloads", anchor.id, published);
                }
            }
            Err(TrySendError::Closed(_)) => {
                info!("[node {}] transport closed after {} payloads", anchor.id, published);
                break;
            }
            Err(TrySendError::Full(_)) => {
                warn!("[node {}] transport full, payload dropped", anchor.id);
            }
        }
    }
}

/// Newline-delimited JSON payloads from stdin.
pub async fn stdin_loop(tx: Sender<Vec<u8>>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if tx.send(line.as_bytes().to_vec()).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                info!("stdin closed");
                break;
            }
            Err(e) => {
                warn!("stdin read failed: {}", e);
                break;
            }
        }
    }
}

/// Transport receive path: every payload goes through the decoder into the pipeline.
pub async fn forward_payloads(mut rx: Receiver<Vec<u8>>, master: &MasterHandle) {
    master.board.set_transport_connected(true);
    while let Some(payload) = rx.recv().await {
        master.submit_payload(&payload).await;
    }
    master.board.set_transport_connected(false);
}

/// Why a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Deadline,
    InputExhausted,
    Interrupted,
}

/// Wait for the transport to finish, the optional deadline or ctrl-c.
///
/// When the transport finishes first, queued readings and alerts get `drain`
/// to flush through before returning.
pub async fn run_until_done(
    transport: JoinHandle<()>,
    deadline: Option<Duration>,
    drain: Duration,
) -> StopReason {
    let deadline = async {
        match deadline {
            Some(d) => sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        _ = deadline => StopReason::Deadline,
        _ = transport => {
            sleep(drain).await;
            StopReason::InputExhausted
        }
        Ok(()) = tokio::signal::ctrl_c() => StopReason::Interrupted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder;
    use crate::fall_detector::FallDetector;
    use crate::fusion::FusionEngine;
    use crate::config::MasterConfig;
    use crate::types::AlertKind;

    fn run_scenario(scenario: Scenario, until_ms: u64) -> Vec<AlertKind> {
        let config = MasterConfig::default();
        let mut fusion = FusionEngine::from_config(&config);
        let mut detector = FallDetector::from_config(&config);
        let mut alerts = Vec::new();

        let mut t = 0;
        while t <= until_ms {
            for (i, anchor) in config.modules.iter().enumerate() {
                let reading = simulated_reading(scenario, anchor, t, i as u64 * 15);
                let json = NodePayload::from_reading(&reading).to_json();
                let decoded = decoder::decode_str(&json).unwrap();
                if let Some(fused) = fusion.ingest(decoded) {
                    if let Some(alert) = detector.process(&fused) {
                        alerts.push(alert.kind);
                    }
                }
            }
            t += NODE_PERIOD_MS;
        }
        alerts
    }

    #[test]
    fn test_fall_scenario_confirms_once() {
        assert_eq!(run_scenario(Scenario::Fall, 40_000), vec![AlertKind::FallDetected]);
    }

    #[test]
    fn test_stumble_and_calm_raise_nothing() {
        assert!(run_scenario(Scenario::Stumble, 40_000).is_empty());
        assert!(run_scenario(Scenario::Calm, 40_000).is_empty());
    }

    #[test]
    fn test_simulated_distance_is_valid() {
        let anchor = ModuleAnchor::new(1, 0.0, 0.5);
        for t in (0..20_000).step_by(100) {
            let r = simulated_reading(Scenario::Calm, &anchor, t, 0);
            assert!(r.distance_m.is_finite() && r.distance_m >= 0.0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_node_loop_publishes_decodable_payloads() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(10);
        let handle = tokio::spawn(node_loop(ModuleAnchor::new(2, 3.0, 0.5), Scenario::Calm, 0, tx));
        let payload = rx.recv().await.unwrap();
        let reading = decoder::decode(&payload).unwrap();
        assert_eq!(reading.module_id, 2);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_input_ends_timed_run() {
        let transport = tokio::spawn(sleep(Duration::from_secs(1)));
        let started = Instant::now();
        let reason = run_until_done(
            transport,
            Some(Duration::from_secs(600)),
            Duration::from_millis(500),
        )
        .await;
        assert_eq!(reason, StopReason::InputExhausted);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_ends_run_with_live_input() {
        let transport = tokio::spawn(sleep(Duration::from_secs(3600)));
        let reason =
            run_until_done(transport, Some(Duration::from_secs(5)), Duration::from_millis(500)).await;
        assert_eq!(reason, StopReason::Deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_untimed_run_waits_for_input() {
        let transport = tokio::spawn(sleep(Duration::from_secs(90)));
        let started = Instant::now();
        let reason = run_until_done(transport, None, Duration::from_millis(500)).await;
        assert_eq!(reason, StopReason::InputExhausted);
        assert!(started.elapsed() >= Duration::from_secs(90));
    }
}
