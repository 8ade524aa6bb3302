//! Node payload decoding.
//!
//! Radar nodes publish one JSON object per cycle:
//!
//! ```json
//! {"id_module": 1, "timestamp": 12345, "distance_m": 1.42, "posture": "STANDING", "signal": 87}
//! ```
//!
//! Anything that does not decode into a valid [`SensorReading`] is rejected here,
//! so nothing downstream ever sees a half-parsed reading.

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::types::{Posture, SensorReading};

/// Longest posture string the node firmware can send.
pub const MAX_POSTURE_LEN: usize = 15;

/// Payload exactly as it appears on the wire.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodePayload {
    pub id_module: i64,
    pub timestamp: u64,
    pub distance_m: f64,
    pub posture: String,
    pub signal: i32,
}

impl NodePayload {
    pub fn from_reading(reading: &SensorReading) -> Self {
        Self {
            id_module: reading.module_id as i64,
            timestamp: reading.timestamp,
            distance_m: reading.distance_m,
            posture: reading.posture.as_str().to_string(),
            signal: reading.signal,
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing plain numbers and a string cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

pub fn decode(raw: &[u8]) -> Result<SensorReading, DecodeError> {
    let payload: NodePayload =
        serde_json::from_slice(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    validate(payload)
}

pub fn decode_str(raw: &str) -> Result<SensorReading, DecodeError> {
    decode(raw.as_bytes())
}

fn validate(payload: NodePayload) -> Result<SensorReading, DecodeError> {
    if payload.id_module < 1 || payload.id_module > u32::MAX as i64 {
        return Err(DecodeError::InvalidModuleId(payload.id_module));
    }
    if !payload.distance_m.is_finite() || payload.distance_m < 0.0 {
        return Err(DecodeError::InvalidDistance(payload.distance_m));
    }
    if payload.posture.len() > MAX_POSTURE_LEN {
        return Err(DecodeError::PostureTooLong(payload.posture.len()));
    }
    let posture = Posture::from_wire(&payload.posture)
        .ok_or_else(|| DecodeError::UnknownPosture(payload.posture.clone()))?;

    Ok(SensorReading {
        module_id: payload.id_module as u32,
        timestamp: payload.timestamp,
        distance_m: payload.distance_m,
        posture,
        signal: payload.signal,
    })
}
