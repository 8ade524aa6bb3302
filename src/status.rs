use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::alerts::{AlertHistory, AlertWire};
use crate::watchdog::{LivenessTable, MasterClock, ModuleStatus};

/// Pipeline counters, bumped lock-free from the tasks.
#[derive(Default)]
pub struct PipelineCounters {
    pub readings_accepted: AtomicU64,
    pub readings_rejected: AtomicU64,
    pub fused_emitted: AtomicU64,
    pub falls_confirmed: AtomicU64,
    pub messages_dropped: AtomicU64,
}

impl PipelineCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct StatusSnapshot {
    /// Wall-clock time of the snapshot, unix seconds.
    pub timestamp: f64,
    pub uptime_seconds: u64,
    pub transport_connected: bool,
    pub modules: Vec<ModuleStatus>,
    /// Oldest first.
    pub last_alerts: Vec<AlertWire>,
    pub readings_accepted: u64,
    pub readings_rejected: u64,
    pub fused_emitted: u64,
    pub falls_confirmed: u64,
    pub messages_dropped: u64,
}

/// Read-only view over the shared pipeline state for status reporting.
pub struct StatusBoard {
    clock: MasterClock,
    liveness: Arc<LivenessTable>,
    history: Arc<AlertHistory>,
    transport_connected: AtomicBool,
    pub counters: PipelineCounters,
}

impl StatusBoard {
    pub fn new(clock: MasterClock, liveness: Arc<LivenessTable>, history: Arc<AlertHistory>) -> Self {
        Self {
            clock,
            liveness,
            history,
            transport_connected: AtomicBool::new(false),
            counters: PipelineCounters::default(),
        }
    }

    pub fn set_transport_connected(&self, connected: bool) {
        self.transport_connected.store(connected, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let c = &self.counters;
        StatusSnapshot {
            timestamp: current_timestamp(),
            uptime_seconds: self.clock.now_ms() / 1000,
            transport_connected: self.transport_connected.load(Ordering::Relaxed),
            modules: self.liveness.snapshot(),
            last_alerts: self.history.recent().iter().map(AlertWire::from).collect(),
            readings_accepted: c.readings_accepted.load(Ordering::Relaxed),
            readings_rejected: c.readings_rejected.load(Ordering::Relaxed),
            fused_emitted: c.fused_emitted.load(Ordering::Relaxed),
            falls_confirmed: c.falls_confirmed.load(Ordering::Relaxed),
            messages_dropped: c.messages_dropped.load(Ordering::Relaxed),
        }
    }
}

fn current_timestamp() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
