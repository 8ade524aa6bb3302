// pipeline.rs - Task wiring for the master node
//
//   payload ─decode─▶ [readings] ─▶ fusion ─▶ [fused] ─▶ fall detector ─▶ [alerts] ─▶ sink
//                                     │                                      ▲
//                                     └─ arrival ─▶ liveness ◀─ watchdog ────┘
//
// Every queue is bounded. Producers wait at most `send_timeout` for room, then
// drop the message with a warning. Nothing is retried.

use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::task::JoinHandle;

use crate::alerts::{alert_sink_task, AlertHandler, AlertHistory};
use crate::config::MasterConfig;
use crate::decoder;
use crate::error::MasterResult;
use crate::fall_detector::FallDetector;
use crate::fusion::FusionEngine;
use crate::status::{PipelineCounters, StatusBoard};
use crate::types::{AlertRecord, FusedReading, SensorReading};
use crate::watchdog::{watchdog_task, LivenessTable, MasterClock};

/// Send with a bounded wait. Returns false if the message was dropped.
pub async fn send_or_drop<T>(
    tx: &mpsc::Sender<T>,
    msg: T,
    timeout: Duration,
    queue: &str,
) -> bool {
    match tx.send_timeout(msg, timeout).await {
        Ok(()) => true,
        Err(SendTimeoutError::Timeout(_)) => {
            warn!("{} queue full, message dropped", queue);
            false
        }
        Err(SendTimeoutError::Closed(_)) => {
            warn!("{} queue closed, message dropped", queue);
            false
        }
    }
}

/// Running pipeline. Dropping it leaves the tasks running; they live for the process.
pub struct MasterHandle {
    readings: mpsc::Sender<SensorReading>,
    send_timeout: Duration,
    pub board: Arc<StatusBoard>,
    pub history: Arc<AlertHistory>,
    pub liveness: Arc<LivenessTable>,
    pub clock: MasterClock,
    tasks: Vec<JoinHandle<()>>,
}

impl MasterHandle {
    /// Decode a raw node payload and queue it. Rejected payloads are logged and counted.
    pub async fn submit_payload(&self, raw: &[u8]) -> bool {
        match decoder::decode(raw) {
            Ok(reading) => self.submit(reading).await,
            Err(e) => {
                warn!("Rejected payload: {}", e);
                PipelineCounters::bump(&self.board.counters.readings_rejected);
                false
            }
        }
    }

    pub async fn submit(&self, reading: SensorReading) -> bool {
        let sent = send_or_drop(&self.readings, reading, self.send_timeout, "reading").await;
        let counters = &self.board.counters;
        if sent {
            PipelineCounters::bump(&counters.readings_accepted);
        } else {
            PipelineCounters::bump(&counters.messages_dropped);
        }
        sent
    }

    pub fn abort(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Spawn fusion, fall detector, alert sink and watchdog tasks.
///
/// The config is validated first; nothing is spawned if it is rejected.
pub fn spawn_master(
    config: &MasterConfig,
    handlers: Vec<Box<dyn AlertHandler>>,
) -> MasterResult<MasterHandle> {
    config.validate()?;

    let clock = MasterClock::start();
    let liveness = Arc::new(LivenessTable::from_config(config));
    let history = Arc::new(AlertHistory::new(config.alert_history_capacity));
    let board = Arc::new(StatusBoard::new(clock, liveness.clone(), history.clone()));
    let send_timeout = config.send_timeout();

    let (reading_tx, reading_rx) = mpsc::channel::<SensorReading>(config.reading_queue);
    let (fused_tx, fused_rx) = mpsc::channel::<FusedReading>(config.fused_queue);
    let (alert_tx, alert_rx) = mpsc::channel::<AlertRecord>(config.alert_queue);

    let tasks = vec![
        tokio::spawn(fusion_task(
            reading_rx,
            FusionEngine::from_config(config),
            liveness.clone(),
            clock,
            fused_tx,
            alert_tx.clone(),
            board.clone(),
            send_timeout,
        )),
        tokio::spawn(fall_detector_task(
            fused_rx,
            FallDetector::from_config(config),
            alert_tx.clone(),
            board.clone(),
            send_timeout,
        )),
        tokio::spawn(alert_sink_task(alert_rx, history.clone(), handlers)),
        tokio::spawn(watchdog_task(
            liveness.clone(),
            clock,
            config.watchdog_interval(),
            alert_tx,
            board.clone(),
            send_timeout,
        )),
    ];
    info!(
        "Master pipeline started: modules {:?}, sync window {} ms",
        config.module_ids(),
        config.sync_window_ms
    );

    Ok(MasterHandle {
        readings: reading_tx,
        send_timeout,
        board,
        history,
        liveness,
        clock,
        tasks,
    })
}

#[allow(clippy::too_many_arguments)]
async fn fusion_task(
    mut rx: mpsc::Receiver<SensorReading>,
    mut engine: FusionEngine,
    liveness: Arc<LivenessTable>,
    clock: MasterClock,
    fused_tx: mpsc::Sender<FusedReading>,
    alert_tx: mpsc::Sender<AlertRecord>,
    board: Arc<StatusBoard>,
    send_timeout: Duration,
) {
    while let Some(reading) = rx.recv().await {
        // Arrival bookkeeping runs for every reading, paired or not.
        if let Some(online) = liveness.record_arrival(reading.module_id, clock.now_ms()) {
            if !send_or_drop(&alert_tx, online, send_timeout, "alert").await {
                PipelineCounters::bump(&board.counters.messages_dropped);
            }
        }

        if let Some(fused) = engine.ingest(reading) {
            PipelineCounters::bump(&board.counters.fused_emitted);
            if !send_or_drop(&fused_tx, fused, send_timeout, "fused").await {
                PipelineCounters::bump(&board.counters.messages_dropped);
            }
        }
    }
    debug!("Reading queue closed, fusion stopping");
}

async fn fall_detector_task(
    mut rx: mpsc::Receiver<FusedReading>,
    mut detector: FallDetector,
    alert_tx: mpsc::Sender<AlertRecord>,
    board: Arc<StatusBoard>,
    send_timeout: Duration,
) {
    while let Some(fused) = rx.recv().await {
        if let Some(alert) = detector.process(&fused) {
            PipelineCounters::bump(&board.counters.falls_confirmed);
            if !send_or_drop(&alert_tx, alert, send_timeout, "alert").await {
                PipelineCounters::bump(&board.counters.messages_dropped);
            }
        }
    }
    debug!("Fused queue closed, fall detector stopping");
}
