//! Data models for the rig and the batch workflow
//!
//! This module provides:
//! - Hardware component identifiers and calibration state
//! - The shared component registry read by the readiness gate
//! - Batch, per-egg results and accumulated statistics
//! - Connection status of the rig controller
//! - The work-process state enumeration

pub mod batch;
pub mod component;
pub mod device;

pub use batch::{Batch, BatchStats, EggQuality, EggResult, EggSize};
pub use component::{CalibrationState, Component, ComponentRegistry, ComponentStatus};
pub use device::DeviceStatus;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Work-process phase
///
/// Transitions are strictly forward except for reset to `Idle` and the
/// `Error` interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Nothing running
    #[default]
    Idle,
    /// Preparing the rig
    GettingReady,
    /// Loading eggs onto the conveyor
    LoadEggs,
    /// Loaded and about to process
    ReadyToProcess,
    /// Inspecting eggs one by one
    Processing,
    /// Batch finished
    Completed,
    /// A fault interrupted the batch
    Error,
}

impl ProcessState {
    /// Wire name of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::GettingReady => "getting_ready",
            Self::LoadEggs => "load_eggs",
            Self::ReadyToProcess => "ready_to_process",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// States from which an explicit reset is accepted
    pub fn is_resettable(&self) -> bool {
        matches!(self, Self::Idle | Self::Completed | Self::Error)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_state_wire_names() {
        let json = serde_json::to_string(&ProcessState::ReadyToProcess).unwrap();
        assert_eq!(json, "\"ready_to_process\"");
        assert_eq!(ProcessState::LoadEggs.to_string(), "load_eggs");
    }

    #[test]
    fn test_resettable_states() {
        assert!(ProcessState::Idle.is_resettable());
        assert!(ProcessState::Completed.is_resettable());
        assert!(ProcessState::Error.is_resettable());
        assert!(!ProcessState::Processing.is_resettable());
        assert!(!ProcessState::GettingReady.is_resettable());
    }
}
