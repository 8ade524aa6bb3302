pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Posture classification reported by a radar node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Posture {
    Standing,
    Sitting,
    Still,
    Moving,
    Lying,
    Unknown,
}

impl Posture {
    pub const ALL: [Posture; 6] = [
        Posture::Standing,
        Posture::Sitting,
        Posture::Still,
        Posture::Moving,
        Posture::Lying,
        Posture::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Posture::Standing => "STANDING",
            Posture::Sitting => "SITTING",
            Posture::Still => "STILL",
            Posture::Moving => "MOVING",
            Posture::Lying => "LYING",
            Posture::Unknown => "UNKNOWN",
        }
    }

    /// Parse the wire spelling. Case-sensitive, like the node firmware emits it.
    pub fn from_wire(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.as_str() == s)
    }

    pub fn is_lying(&self) -> bool {
        matches!(self, Posture::Lying)
    }

    /// Postures a fall can start from.
    pub fn is_upright_or_active(&self) -> bool {
        matches!(
            self,
            Posture::Standing | Posture::Sitting | Posture::Moving | Posture::Still
        )
    }
}

impl fmt::Display for Posture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One radar module's report at one instant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub module_id: u32,
    /// Node-local monotonic milliseconds.
    pub timestamp: u64,
    pub distance_m: f64,
    pub posture: Posture,
    pub signal: i32,
}

/// Output of the fusion engine for one synchronized pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FusedReading {
    pub x: f64,
    pub y: f64,
    pub final_posture: Posture,
    /// Later of the two source timestamps.
    pub timestamp: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    FallDetected,
    ModuleOffline,
    ModuleOnline,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::FallDetected => "FALL_DETECTED",
            AlertKind::ModuleOffline => "MODULE_OFFLINE",
            AlertKind::ModuleOnline => "MODULE_ONLINE",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upper bound on `AlertRecord::description`, in bytes.
pub const MAX_DESCRIPTION_LEN: usize = 128;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub kind: AlertKind,
    pub description: String,
    pub timestamp: u64,
}

impl AlertRecord {
    pub fn new(kind: AlertKind, description: impl Into<String>, timestamp: u64) -> Self {
        let mut description = description.into();
        truncate_on_char_boundary(&mut description, MAX_DESCRIPTION_LEN);
        Self {
            kind,
            description,
            timestamp,
        }
    }

    pub fn fall_detected(fused: &FusedReading) -> Self {
        Self::new(
            AlertKind::FallDetected,
            format!(
                "Fall detected at {} (pos: {:.2},{:.2})",
                fused.timestamp, fused.x, fused.y
            ),
            fused.timestamp,
        )
    }

    pub fn module_never_reported(module_id: u32, now_ms: u64) -> Self {
        Self::new(
            AlertKind::ModuleOffline,
            format!("Module {} never reported.", module_id),
            now_ms,
        )
    }

    pub fn module_offline(module_id: u32, silent_ms: u64, now_ms: u64) -> Self {
        Self::new(
            AlertKind::ModuleOffline,
            format!("Module {} offline. Last seen {} ms ago.", module_id, silent_ms),
            now_ms,
        )
    }

    pub fn module_online(module_id: u32, now_ms: u64) -> Self {
        Self::new(
            AlertKind::ModuleOnline,
            format!("Module {} back online.", module_id),
            now_ms,
        )
    }
}

fn truncate_on_char_boundary(s: &mut String, max_len: usize) {
    if s.len() <= max_len {
        return;
    }
    let mut cut = max_len;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}
