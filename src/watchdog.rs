use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration, Instant};

use crate::config::MasterConfig;
use crate::pipeline::send_or_drop;
use crate::status::{PipelineCounters, StatusBoard};
use crate::types::AlertRecord;

/// Master-local monotonic clock, milliseconds since startup.
///
/// Liveness never uses node timestamps: each node has its own clock.
#[derive(Clone, Copy, Debug)]
pub struct MasterClock {
    start: Instant,
}

impl MasterClock {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for MasterClock {
    fn default() -> Self {
        Self::start()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct ModuleLiveness {
    /// `None` until the first reading arrives.
    last_seen_ms: Option<u64>,
    offline_alerted: bool,
}

/// Per-module status exposed to the status board.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModuleStatus {
    pub module_id: u32,
    pub online: bool,
    pub last_seen_ms: Option<u64>,
}

/// Last-seen tracking for every configured module.
///
/// Written by the arrival path and the watchdog scan; both hold the lock only
/// for the read-modify-write.
pub struct LivenessTable {
    modules: Mutex<BTreeMap<u32, ModuleLiveness>>,
    module_timeout_ms: u64,
    startup_grace_ms: u64,
    emit_online_alerts: bool,
}

impl LivenessTable {
    pub fn new(
        module_ids: &[u32],
        module_timeout_ms: u64,
        startup_grace_ms: u64,
        emit_online_alerts: bool,
    ) -> Self {
        let modules = module_ids
            .iter()
            .map(|id| (*id, ModuleLiveness::default()))
            .collect();
        Self {
            modules: Mutex::new(modules),
            module_timeout_ms,
            startup_grace_ms,
            emit_online_alerts,
        }
    }

    pub fn from_config(config: &MasterConfig) -> Self {
        Self::new(
            &config.module_ids(),
            config.module_timeout_ms,
            config.startup_grace_ms,
            config.emit_online_alerts,
        )
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<u32, ModuleLiveness>> {
        self.modules.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Note a reading from `module_id`. Returns MODULE_ONLINE when the module
    /// had been reported offline and online alerts are enabled.
    pub fn record_arrival(&self, module_id: u32, now_ms: u64) -> Option<AlertRecord> {
        let was_alerted = {
            let mut modules = self.lock();
            let entry = modules.get_mut(&module_id)?;
            entry.last_seen_ms = Some(now_ms);
            std::mem::replace(&mut entry.offline_alerted, false)
        };

        if !was_alerted {
            return None;
        }
        info!("Module {} is back online", module_id);
        self.emit_online_alerts
            .then(|| AlertRecord::module_online(module_id, now_ms))
    }

    /// One watchdog pass. Each silent module is reported once until it reports again.
    pub fn scan(&self, now_ms: u64) -> Vec<AlertRecord> {
        let mut alerts = Vec::new();
        let mut modules = self.lock();

        for (id, entry) in modules.iter_mut() {
            if entry.offline_alerted {
                continue;
            }
            match entry.last_seen_ms {
                None if now_ms > self.startup_grace_ms => {
                    alerts.push(AlertRecord::module_never_reported(*id, now_ms));
                    entry.offline_alerted = true;
                }
                None => {}
                Some(last) => {
                    let silent_ms = now_ms.saturating_sub(last);
                    if silent_ms > self.module_timeout_ms {
                        alerts.push(AlertRecord::module_offline(*id, silent_ms, now_ms));
                        entry.offline_alerted = true;
                    }
                }
            }
        }

        alerts
    }

    pub fn snapshot(&self) -> Vec<ModuleStatus> {
        self.lock()
            .iter()
            .map(|(id, entry)| ModuleStatus {
                module_id: *id,
                online: entry.last_seen_ms.is_some() && !entry.offline_alerted,
                last_seen_ms: entry.last_seen_ms,
            })
            .collect()
    }
}

/// Periodic liveness scan. Runs for the life of the process.
pub async fn watchdog_task(
    table: Arc<LivenessTable>,
    clock: MasterClock,
    interval: Duration,
    alert_tx: mpsc::Sender<AlertRecord>,
    board: Arc<StatusBoard>,
    send_timeout: Duration,
) {
    loop {
        sleep(interval).await;

        let alerts = table.scan(clock.now_ms());
        for alert in alerts {
            warn!("{}", alert.description);
            if !send_or_drop(&alert_tx, alert, send_timeout, "alert").await {
                PipelineCounters::bump(&board.counters.messages_dropped);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertHistory;
    use crate::types::AlertKind;
    use std::sync::atomic::Ordering;

    fn table(emit_online: bool) -> LivenessTable {
        LivenessTable::new(&[1, 2], 5000, 5000, emit_online)
    }

    #[test]
    fn test_never_reported_after_grace() {
        let t = table(true);
        assert!(t.scan(4000).is_empty());
        assert!(t.scan(5000).is_empty());

        let alerts = t.scan(6000);
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].kind, AlertKind::ModuleOffline);
        assert_eq!(alerts[0].description, "Module 1 never reported.");
        assert_eq!(alerts[1].description, "Module 2 never reported.");
    }

    #[test]
    fn test_single_offline_alert() {
        let t = table(true);
        t.record_arrival(1, 1000);
        t.record_arrival(2, 1000);
        assert!(t.scan(5000).is_empty());

        t.record_arrival(2, 6000);
        let alerts = t.scan(7000);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].description, "Module 1 offline. Last seen 6000 ms ago.");
        assert_eq!(alerts[0].timestamp, 7000);

        // Repeated scans do not duplicate while still silent.
        t.record_arrival(2, 8000);
        assert!(t.scan(9000).is_empty());
        t.record_arrival(2, 10_000);
        assert!(t.scan(11_000).is_empty());
    }

    #[test]
    fn test_arrival_clears_and_debounces() {
        let t = table(true);
        t.record_arrival(1, 0);
        t.record_arrival(2, 0);
        assert_eq!(t.scan(6000).len(), 2);

        let online = t.record_arrival(1, 6500).unwrap();
        assert_eq!(online.kind, AlertKind::ModuleOnline);
        assert_eq!(online.timestamp, 6500);
        // Second arrival is not a state change.
        assert!(t.record_arrival(1, 6600).is_none());

        let alerts = t.scan(12_000);
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].description.starts_with("Module 1 offline."));
    }

    #[test]
    fn test_no_realert_until_timeout_recurs() {
        let t = table(true);
        t.record_arrival(1, 0);
        t.record_arrival(2, 0);
        assert_eq!(t.scan(6000).len(), 2);

        assert!(t.record_arrival(1, 6500).is_some());
        assert!(t.scan(8000).is_empty());
        assert!(t.scan(11_500).is_empty());

        let alerts = t.scan(12_000);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].description, "Module 1 offline. Last seen 5500 ms ago.");
        assert!(t.scan(13_000).is_empty());
    }

    #[test]
    fn test_online_alert_can_be_disabled() {
        let t = table(false);
        t.record_arrival(1, 0);
        assert_eq!(t.scan(6000).len(), 2);
        assert!(t.record_arrival(1, 7000).is_none());
        let status = t.snapshot();
        assert!(status[0].online);
        assert!(!status[1].online);
    }

    #[test]
    fn test_scan_idempotent() {
        let t = table(true);
        t.record_arrival(1, 0);
        let first = t.scan(20_000);
        assert_eq!(first.len(), 2);
        assert!(t.scan(20_000).is_empty());
        assert!(t.scan(40_000).is_empty());
    }

    #[test]
    fn test_unknown_module_ignored() {
        let t = table(true);
        assert!(t.record_arrival(9, 100).is_none());
        assert_eq!(t.snapshot().len(), 2);
    }

    #[test]
    fn test_clock_is_monotonic() {
        let clock = MasterClock::start();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_task_emits_once() {
        let t = Arc::new(table(true));
        let (tx, mut rx) = mpsc::channel(5);
        let clock = MasterClock::start();
        let board = Arc::new(StatusBoard::new(clock, t.clone(), Arc::new(AlertHistory::new(5))));
        tokio::spawn(watchdog_task(
            t.clone(),
            clock,
            Duration::from_millis(2000),
            tx,
            board,
            Duration::from_millis(100),
        ));

        sleep(Duration::from_millis(6500)).await;
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.description, "Module 1 never reported.");
        assert_eq!(second.description, "Module 2 never reported.");

        sleep(Duration::from_millis(10_000)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_counts_dropped_alerts() {
        let t = Arc::new(table(true));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let clock = MasterClock::start();
        let board = Arc::new(StatusBoard::new(clock, t.clone(), Arc::new(AlertHistory::new(5))));
        tokio::spawn(watchdog_task(
            t.clone(),
            clock,
            Duration::from_millis(2000),
            tx,
            board.clone(),
            Duration::from_millis(100),
        ));

        sleep(Duration::from_millis(6500)).await;
        assert_eq!(board.counters.messages_dropped.load(Ordering::Relaxed), 2);
    }
}
