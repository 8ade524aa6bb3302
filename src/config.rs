// config.rs - Master node configuration
//
// Everything tunable about the pipeline lives here: anchor geometry, timing
// thresholds, queue depths and alert routing. Loaded from an optional JSON file;
// any field left out keeps its default.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::RoomPoint;

/// A radar module's id and its mounting position in the room frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModuleAnchor {
    pub id: u32,
    pub x: f64,
    pub y: f64,
}

impl ModuleAnchor {
    pub fn new(id: u32, x: f64, y: f64) -> Self {
        Self { id, x, y }
    }

    pub fn position(&self) -> RoomPoint {
        RoomPoint::new(self.x, self.y)
    }
}

/// Which side of the anchor1 → anchor2 baseline the room lies on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomSide {
    Left,
    Right,
}

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    // ── Geometry ──
    pub modules: Vec<ModuleAnchor>,
    pub room_side: RoomSide,

    // ── Fusion ──
    pub sync_window_ms: u64,

    // ── Fall detection ──
    pub fall_transition_max_ms: u64,
    pub lying_confirmation_ms: u64,

    // ── Liveness ──
    pub watchdog_interval_ms: u64,
    pub module_timeout_ms: u64,
    pub startup_grace_ms: u64,

    // ── Queues ──
    pub reading_queue: usize,
    pub fused_queue: usize,
    pub alert_queue: usize,
    pub send_timeout_ms: u64,

    // ── Alerts ──
    pub alert_history_capacity: usize,
    pub emit_online_alerts: bool,
    pub alert_webhook_url: Option<String>,
    pub alert_topic: String,

    // ── Status endpoint ──
    pub status_port: Option<u16>,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            modules: vec![ModuleAnchor::new(1, 0.0, 0.5), ModuleAnchor::new(2, 3.0, 0.5)],
            room_side: RoomSide::Left,
            sync_window_ms: 500,
            fall_transition_max_ms: 1000,
            lying_confirmation_ms: 20_000,
            watchdog_interval_ms: 2000,
            module_timeout_ms: 5000,
            startup_grace_ms: 5000,
            reading_queue: 10,
            fused_queue: 5,
            alert_queue: 5,
            send_timeout_ms: 100,
            alert_history_capacity: 5,
            emit_online_alerts: true,
            alert_webhook_url: None,
            alert_topic: "home/room1/alert".to_string(),
            status_port: None,
        }
    }
}

impl MasterConfig {
    /// Load from a JSON file and validate. Missing fields take defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: MasterConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.modules.len() != 2 {
            return Err(ConfigError::Invalid(format!(
                "exactly 2 modules required, got {}",
                self.modules.len()
            )));
        }

        let mut seen = HashSet::new();
        for m in &self.modules {
            if m.id == 0 {
                return Err(ConfigError::Invalid("module ids start at 1".into()));
            }
            if !seen.insert(m.id) {
                return Err(ConfigError::Invalid(format!("duplicate module id {}", m.id)));
            }
            if !m.x.is_finite() || !m.y.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "module {} has a non-finite anchor",
                    m.id
                )));
            }
        }

        let nonzero = [
            ("watchdog_interval_ms", self.watchdog_interval_ms),
            ("module_timeout_ms", self.module_timeout_ms),
            ("lying_confirmation_ms", self.lying_confirmation_ms),
            ("fall_transition_max_ms", self.fall_transition_max_ms),
            ("reading_queue", self.reading_queue as u64),
            ("fused_queue", self.fused_queue as u64),
            ("alert_queue", self.alert_queue as u64),
            ("alert_history_capacity", self.alert_history_capacity as u64),
        ];
        for (name, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be > 0", name)));
            }
        }

        Ok(())
    }

    pub fn module_ids(&self) -> Vec<u32> {
        self.modules.iter().map(|m| m.id).collect()
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }
}
