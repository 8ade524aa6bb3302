// fusion.rs - Pairs readings from the two radar modules
//
// Pure computation: no tokio, no I/O. One slot per configured module holds the
// latest unpaired reading. A fused reading is produced only when both slots are
// filled with timestamps inside the sync window.

use log::{debug, info, warn};

use crate::config::{MasterConfig, RoomSide};
use crate::triangulation::Triangulator;
use crate::types::{FusedReading, Posture, RoomPoint, SensorReading};

// ─── Consensus ───────────────────────────────────────────────────────────────

/// Resolve the posture two modules agree on.
///
/// LYING beats MOVING beats SITTING beats STANDING; anything else is STILL.
/// Symmetric in its arguments.
pub fn consensus(a: Posture, b: Posture) -> Posture {
    const PRECEDENCE: [Posture; 4] = [
        Posture::Lying,
        Posture::Moving,
        Posture::Sitting,
        Posture::Standing,
    ];
    PRECEDENCE
        .into_iter()
        .find(|p| *p == a || *p == b)
        .unwrap_or(Posture::Still)
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum IngestOutcome {
    Fused(FusedReading),
    /// Reading stored; the other slot is still empty.
    Waiting,
    /// Pair too far apart in time; the older slot was cleared.
    Desynchronized { dropped_module: u32, gap_ms: u64 },
    UnknownModule(u32),
}

// ─── The fusion engine ───────────────────────────────────────────────────────

#[derive(Debug)]
struct Slot {
    module_id: u32,
    reading: Option<SensorReading>,
}

#[derive(Debug)]
pub struct FusionEngine {
    slots: [Slot; 2],
    sync_window_ms: u64,
    triangulator: Triangulator,
}

impl FusionEngine {
    pub fn new(
        anchor_a: (u32, RoomPoint),
        anchor_b: (u32, RoomPoint),
        side: RoomSide,
        sync_window_ms: u64,
    ) -> Self {
        Self {
            slots: [
                Slot { module_id: anchor_a.0, reading: None },
                Slot { module_id: anchor_b.0, reading: None },
            ],
            sync_window_ms,
            triangulator: Triangulator::new(anchor_a.1, anchor_b.1, side),
        }
    }

    /// Build from a validated config (exactly two modules).
    pub fn from_config(config: &MasterConfig) -> Self {
        let anchor = |i: usize| {
            config
                .modules
                .get(i)
                .map(|m| (m.id, m.position()))
                .unwrap_or((i as u32 + 1, RoomPoint::origin()))
        };
        Self::new(anchor(0), anchor(1), config.room_side, config.sync_window_ms)
    }

    pub fn ingest(&mut self, reading: SensorReading) -> Option<FusedReading> {
        match self.ingest_detailed(reading) {
            IngestOutcome::Fused(fused) => Some(fused),
            _ => None,
        }
    }

    pub fn ingest_detailed(&mut self, reading: SensorReading) -> IngestOutcome {
        let Some(idx) = self.slots.iter().position(|s| s.module_id == reading.module_id) else {
            warn!("Reading from unknown module {}, dropped", reading.module_id);
            return IngestOutcome::UnknownModule(reading.module_id);
        };
        debug!(
            "Module {} ts={} dist={:.2} posture={}",
            reading.module_id, reading.timestamp, reading.distance_m, reading.posture
        );
        self.slots[idx].reading = Some(reading);

        let (a, b) = match (&self.slots[0].reading, &self.slots[1].reading) {
            (Some(a), Some(b)) => (a.clone(), b.clone()),
            _ => return IngestOutcome::Waiting,
        };

        let gap_ms = a.timestamp.abs_diff(b.timestamp);
        if gap_ms <= self.sync_window_ms {
            let p = self.triangulator.locate(a.distance_m, b.distance_m);
            let fused = FusedReading {
                x: p.x,
                y: p.y,
                final_posture: consensus(a.posture, b.posture),
                timestamp: a.timestamp.max(b.timestamp),
            };
            info!(
                "Fused ts={} pos=({:.2}, {:.2}) posture={}",
                fused.timestamp, fused.x, fused.y, fused.final_posture
            );
            self.clear();
            IngestOutcome::Fused(fused)
        } else {
            let older = if a.timestamp < b.timestamp { 0 } else { 1 };
            let dropped_module = self.slots[older].module_id;
            self.slots[older].reading = None;
            warn!(
                "Readings {} ms apart (window {} ms), dropped older from module {}",
                gap_ms, self.sync_window_ms, dropped_module
            );
            IngestOutcome::Desynchronized { dropped_module, gap_ms }
        }
    }

    pub fn has_pending(&self, module_id: u32) -> bool {
        self.slots
            .iter()
            .any(|s| s.module_id == module_id && s.reading.is_some())
    }

    fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.reading = None;
        }
    }
}
