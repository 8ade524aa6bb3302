// alerts.rs - Alert sink: history ring, wire format, delivery handlers
//
// Every alert record that reaches the sink is appended to the bounded history
// first, then offered to each handler. A failing handler is logged and skipped;
// it never blocks the others or stops the sink.

use futures::future::{join_all, BoxFuture, FutureExt};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::MasterError;
use crate::types::{AlertKind, AlertRecord};

// ─── History ring ────────────────────────────────────────────────────────────

/// Fixed-capacity alert history. Oldest entries are evicted first.
pub struct AlertHistory {
    entries: Mutex<VecDeque<AlertRecord>>,
    capacity: usize,
}

impl AlertHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<AlertRecord>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, alert: AlertRecord) {
        let mut entries = self.lock();
        if self.capacity == 0 {
            return;
        }
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(alert);
    }

    /// Stored alerts, oldest first.
    pub fn recent(&self) -> Vec<AlertRecord> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── Wire format ─────────────────────────────────────────────────────────────

/// `{"alert_type": "FALL_DETECTED", "description": "...", "timestamp": N}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertWire {
    pub alert_type: AlertKind,
    pub description: String,
    pub timestamp: u64,
}

impl From<&AlertRecord> for AlertWire {
    fn from(alert: &AlertRecord) -> Self {
        Self {
            alert_type: alert.kind,
            description: alert.description.clone(),
            timestamp: alert.timestamp,
        }
    }
}

pub fn to_wire_json(alert: &AlertRecord) -> String {
    serde_json::to_string(&AlertWire::from(alert)).unwrap_or_default()
}

// ─── Handlers ────────────────────────────────────────────────────────────────

pub trait AlertHandler: Send + Sync {
    fn name(&self) -> &str;

    fn handle<'a>(&'a self, alert: &'a AlertRecord) -> BoxFuture<'a, Result<(), MasterError>>;
}

/// Publishes the wire payload on stdout, one JSON line per alert, tagged with
/// the topic a broker would receive it on.
pub struct ConsolePublisher {
    topic: String,
}

#[derive(Serialize)]
struct Envelope<'a> {
    topic: &'a str,
    payload: AlertWire,
}

impl ConsolePublisher {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }

    pub fn envelope(&self, alert: &AlertRecord) -> Result<String, MasterError> {
        serde_json::to_string(&Envelope {
            topic: &self.topic,
            payload: AlertWire::from(alert),
        })
        .map_err(|e| MasterError::Delivery(e.to_string()))
    }
}

impl AlertHandler for ConsolePublisher {
    fn name(&self) -> &str {
        "console"
    }

    fn handle<'a>(&'a self, alert: &'a AlertRecord) -> BoxFuture<'a, Result<(), MasterError>> {
        async move {
            let line = self.envelope(alert)?;
            println!("{}", line);
            Ok::<(), MasterError>(())
        }
        .boxed()
    }
}

/// POSTs the wire payload to an HTTP endpoint.
pub struct WebhookPublisher {
    client: reqwest::Client,
    url: String,
}

impl WebhookPublisher {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            url: url.into(),
        }
    }
}

impl AlertHandler for WebhookPublisher {
    fn name(&self) -> &str {
        "webhook"
    }

    fn handle<'a>(&'a self, alert: &'a AlertRecord) -> BoxFuture<'a, Result<(), MasterError>> {
        async move {
            self.client
                .post(&self.url)
                .json(&AlertWire::from(alert))
                .send()
                .await
                .and_then(|resp| resp.error_for_status())
                .map_err(|e| MasterError::Delivery(format!("{}: {}", self.url, e)))?;
            Ok::<(), MasterError>(())
        }
        .boxed()
    }
}

/// How long the local alarm stays on after a fall.
pub const ANNUNCIATOR_HOLD: Duration = Duration::from_secs(5);

/// Local alarm hook. Fires for confirmed falls only and stays active for the
/// hold period; a new fall during the hold restarts it.
pub struct LogAnnunciator {
    activations: AtomicUsize,
    hold: Duration,
    active_until: Mutex<Option<Instant>>,
}

impl LogAnnunciator {
    pub fn new() -> Self {
        Self::with_hold(ANNUNCIATOR_HOLD)
    }

    pub fn with_hold(hold: Duration) -> Self {
        Self {
            activations: AtomicUsize::new(0),
            hold,
            active_until: Mutex::new(None),
        }
    }

    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::Relaxed)
    }

    pub fn is_active(&self) -> bool {
        let until = *self.lock_until();
        until.map_or(false, |until| Instant::now() < until)
    }

    fn lock_until(&self) -> MutexGuard<'_, Option<Instant>> {
        self.active_until.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn activate(&self) {
        *self.lock_until() = Some(Instant::now() + self.hold);
        self.activations.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for LogAnnunciator {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertHandler for LogAnnunciator {
    fn name(&self) -> &str {
        "annunciator"
    }

    fn handle<'a>(&'a self, alert: &'a AlertRecord) -> BoxFuture<'a, Result<(), MasterError>> {
        async move {
            if alert.kind == AlertKind::FallDetected {
                self.activate();
                error!(
                    "FALL ALARM ({} s): {}",
                    self.hold.as_secs(),
                    alert.description
                );
            }
            Ok(())
        }
        .boxed()
    }
}

impl<T: AlertHandler + ?Sized> AlertHandler for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn handle<'a>(&'a self, alert: &'a AlertRecord) -> BoxFuture<'a, Result<(), MasterError>> {
        (**self).handle(alert)
    }
}

// ─── Sink task ───────────────────────────────────────────────────────────────

pub async fn dispatch(
    alert: &AlertRecord,
    history: &AlertHistory,
    handlers: &[Box<dyn AlertHandler>],
) {
    info!("Alert {}: {}", alert.kind, alert.description);
    history.push(alert.clone());

    let results = join_all(handlers.iter().map(|h| h.handle(alert))).await;
    for (handler, result) in handlers.iter().zip(results) {
        if let Err(e) = result {
            warn!("Alert handler '{}' failed: {}", handler.name(), e);
        }
    }
}

/// Drain the alert queue for the life of the process.
pub async fn alert_sink_task(
    mut rx: mpsc::Receiver<AlertRecord>,
    history: Arc<AlertHistory>,
    handlers: Vec<Box<dyn AlertHandler>>,
) {
    while let Some(alert) = rx.recv().await {
        dispatch(&alert, &history, &handlers).await;
    }
    info!("Alert queue closed, sink stopping");
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl AlertHandler for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn handle<'a>(&'a self, _alert: &'a AlertRecord) -> BoxFuture<'a, Result<(), MasterError>> {
            async { Err(MasterError::Delivery("broker down".into())) }.boxed()
        }
    }

    fn alert(ts: u64) -> AlertRecord {
        AlertRecord::new(AlertKind::ModuleOffline, format!("alert {}", ts), ts)
    }

    #[test]
    fn test_history_evicts_oldest() {
        let history = AlertHistory::new(5);
        for ts in 0..7 {
            history.push(alert(ts));
        }
        let stamps: Vec<u64> = history.recent().iter().map(|a| a.timestamp).collect();
        assert_eq!(stamps, vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_history_partial_fill() {
        let history = AlertHistory::new(5);
        assert!(history.is_empty());
        history.push(alert(1));
        history.push(alert(2));
        assert_eq!(history.len(), 2);
        assert_eq!(history.recent()[0].timestamp, 1);
    }

    #[test]
    fn test_wire_format() {
        let record = AlertRecord::new(AlertKind::FallDetected, "Fall", 20500);
        assert_eq!(
            to_wire_json(&record),
            r#"{"alert_type":"FALL_DETECTED","description":"Fall","timestamp":20500}"#
        );
    }

    #[test]
    fn test_console_envelope_carries_topic() {
        let publisher = ConsolePublisher::new("home/room1/alert");
        let line = publisher.envelope(&alert(3)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["topic"], "home/room1/alert");
        assert_eq!(value["payload"]["alert_type"], "MODULE_OFFLINE");
        assert_eq!(value["payload"]["timestamp"], 3);
    }

    #[tokio::test]
    async fn test_annunciator_fires_for_falls_only() {
        let annunciator = LogAnnunciator::new();
        annunciator.handle(&alert(1)).await.unwrap();
        assert_eq!(annunciator.activations(), 0);

        let fall = AlertRecord::new(AlertKind::FallDetected, "Fall", 2);
        annunciator.handle(&fall).await.unwrap();
        assert_eq!(annunciator.activations(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_annunciator_holds_for_five_seconds() {
        let annunciator = LogAnnunciator::new();
        assert!(!annunciator.is_active());

        annunciator.handle(&alert(1)).await.unwrap();
        assert!(!annunciator.is_active());

        let fall = AlertRecord::new(AlertKind::FallDetected, "Fall", 2);
        annunciator.handle(&fall).await.unwrap();
        assert!(annunciator.is_active());

        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert!(annunciator.is_active());

        // A second fall restarts the hold.
        annunciator.handle(&fall).await.unwrap();
        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert!(annunciator.is_active());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!annunciator.is_active());
        assert_eq!(annunciator.activations(), 2);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_block_others() {
        let history = AlertHistory::new(5);
        let annunciator = Arc::new(LogAnnunciator::new());
        let handlers: Vec<Box<dyn AlertHandler>> =
            vec![Box::new(Failing), Box::new(annunciator.clone())];

        let fall = AlertRecord::new(AlertKind::FallDetected, "Fall", 9);
        dispatch(&fall, &history, &handlers).await;

        assert_eq!(history.len(), 1);
        assert_eq!(annunciator.activations(), 1);
    }

    #[tokio::test]
    async fn test_sink_task_drains_queue() {
        let history = Arc::new(AlertHistory::new(5));
        let (tx, rx) = mpsc::channel(5);
        let sink = tokio::spawn(alert_sink_task(rx, history.clone(), Vec::new()));

        tx.send(alert(1)).await.unwrap();
        tx.send(alert(2)).await.unwrap();
        drop(tx);
        sink.await.unwrap();

        assert_eq!(history.len(), 2);
    }
}
