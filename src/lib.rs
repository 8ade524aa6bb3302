//! Master node of a two-radar fall-detection network.
//!
//! Radar nodes report posture and range; the master pairs their readings,
//! locates the occupant, watches for falls and tracks node liveness.

pub mod alerts;
pub mod config;
pub mod dashboard;
pub mod decoder;
pub mod error;
pub mod fall_detector;
pub mod fusion;
pub mod pipeline;
pub mod sources;
pub mod status;
pub mod triangulation;
pub mod types;
pub mod watchdog;

pub use config::MasterConfig;
pub use error::{ConfigError, DecodeError, MasterError, MasterResult};
pub use pipeline::{spawn_master, MasterHandle};
pub use types::{AlertKind, AlertRecord, FusedReading, Posture, SensorReading};
