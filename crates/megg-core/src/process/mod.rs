//! # Work Process
//!
//! Simulated batch sorting workflow:
//! `idle → getting_ready → load_eggs → ready_to_process → processing → completed`,
//! with `error` on faults and an explicit reset back to `idle`.
//!
//! Each phase waits a random bounded time and emits a `process_update`
//! event. The processing phase inspects eggs one by one, emitting an
//! `egg_result` per egg and a `process_progress` every few eggs and on the
//! last one. A stop takes effect between eggs at the latest.

mod config;
mod inspector;
mod machine;

pub use config::{DelayRange, ProcessConfig};
pub use inspector::{EggInspector, RandomInspector};
pub use machine::WorkProcess;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::data::{Batch, BatchStats, ProcessState};

/// Point-in-time view of the work process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    /// Current phase
    pub status: ProcessState,
    /// Whether a run is active
    pub is_processing: bool,
    /// Current or last batch
    pub current_batch: Option<Batch>,
    /// Statistics of the current or last batch
    pub stats: BatchStats,
    /// Readiness of each tracked component
    pub component_status: BTreeMap<String, bool>,
    /// Whether a batch could be started right now
    pub can_start: bool,
    /// Snapshot time
    pub timestamp: DateTime<Utc>,
}
