//! Event type definitions for the broadcaster.
//!
//! Every event serializes to a flat JSON object carrying a `"type"`
//! discriminator, which is exactly what observers receive on the wire.
//! Events are immutable once created.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::data::{Batch, BatchStats, ComponentStatus, DeviceStatus, EggResult, ProcessState};
use crate::process::ProcessSnapshot;

/// Root event enum for everything sent to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Welcome message sent to a freshly connected observer
    Connection(Welcome),
    /// Reply to `ping`
    Pong {
        /// Reply time.
        timestamp: DateTime<Utc>,
    },
    /// Request-level error; carries no timestamp
    Error {
        /// Description of the problem.
        message: String,
    },
    /// Live device line observed while a calibration runs
    CalibrationProgress(CalibrationOutcome),
    /// Final verdict of a calibration request
    CalibrationResult(CalibrationOutcome),
    /// Full system status
    SystemStatus(Box<SystemStatus>),
    /// Reply to a work-process action
    WorkProcessResponse(WorkProcessResponse),
    /// Reply to the work-process `get_status` action
    WorkProcessStatus(ProcessSnapshot),
    /// Phase transition of the work process
    ProcessUpdate {
        /// New phase.
        status: ProcessState,
        /// Human-readable description.
        message: String,
        /// Statistics, attached to terminal updates.
        #[serde(skip_serializing_if = "Option::is_none", default)]
        stats: Option<BatchStats>,
        /// Batch record, attached to the completion update.
        #[serde(skip_serializing_if = "Option::is_none", default)]
        batch: Option<Batch>,
        /// Transition time.
        timestamp: DateTime<Utc>,
    },
    /// Periodic progress of the processing phase
    ProcessProgress {
        /// Eggs processed so far.
        current: u32,
        /// Target egg count.
        total: u32,
        /// Statistics so far.
        stats: BatchStats,
        /// Report time.
        timestamp: DateTime<Utc>,
    },
    /// Inspection result of a single egg
    EggResult {
        /// 1-based egg number within the batch.
        egg_number: u32,
        /// The inspection result.
        result: EggResult,
    },
    /// Reply to `set_configuration`
    ConfigurationResult {
        /// Whether the configuration was stored.
        success: bool,
        /// Account the configuration belongs to.
        #[serde(rename = "accountId")]
        account_id: Option<String>,
        /// Human-readable description.
        message: String,
        /// Reply time.
        timestamp: DateTime<Utc>,
    },
    /// Reply to `send_command`
    CommandResult(CommandReport),
    /// Immediate acknowledgement of a sorting request
    SortingAck {
        /// The request being acknowledged.
        action: String,
        /// Human-readable description.
        message: String,
        /// Acknowledgement time.
        timestamp: DateTime<Utc>,
    },
    /// Live device line observed during a sorting cycle
    SortingProgress {
        /// The device line.
        message: String,
        /// Observation time.
        timestamp: DateTime<Utc>,
    },
    /// Outcome of `start_sorting`
    SortingResult(CommandReport),
    /// Outcome of `stop_sorting`
    SortingStopResult(CommandReport),
    /// Serial link opened or closed
    ArduinoStatus {
        /// Whether the link is now open.
        connected: bool,
        /// Port involved, if known.
        #[serde(skip_serializing_if = "Option::is_none", default)]
        port: Option<String>,
        /// Human-readable description.
        message: String,
        /// Change time.
        timestamp: DateTime<Utc>,
    },
    /// Raw line received from the device
    ArduinoData {
        /// The line, verbatim.
        message: String,
        /// Receive time.
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    /// Build an error reply
    pub fn error(message: impl Into<String>) -> Self {
        Event::Error {
            message: message.into(),
        }
    }

    /// Build a pong reply stamped now
    pub fn pong() -> Self {
        Event::Pong {
            timestamp: Utc::now(),
        }
    }

    /// Wire discriminator of this event, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Connection(_) => "connection",
            Event::Pong { .. } => "pong",
            Event::Error { .. } => "error",
            Event::CalibrationProgress(_) => "calibration_progress",
            Event::CalibrationResult(_) => "calibration_result",
            Event::SystemStatus(_) => "system_status",
            Event::WorkProcessResponse(_) => "work_process_response",
            Event::WorkProcessStatus(_) => "work_process_status",
            Event::ProcessUpdate { .. } => "process_update",
            Event::ProcessProgress { .. } => "process_progress",
            Event::EggResult { .. } => "egg_result",
            Event::ConfigurationResult { .. } => "configuration_result",
            Event::CommandResult(_) => "command_result",
            Event::SortingAck { .. } => "sorting_ack",
            Event::SortingProgress { .. } => "sorting_progress",
            Event::SortingResult(_) => "sorting_result",
            Event::SortingStopResult(_) => "sorting_stop_result",
            Event::ArduinoStatus { .. } => "arduino_status",
            Event::ArduinoData { .. } => "arduino_data",
        }
    }

    /// Serialize to the JSON text sent to observers
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Calibration lifecycle status as reported to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStatus {
    /// The device acknowledged the start of calibration
    Started,
    /// An intermediate device line
    InProgress,
    /// Calibration finished successfully
    Completed,
    /// Calibration failed
    Failed,
}

/// Payload of calibration progress and result events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOutcome {
    /// Component name, or `unknown` when it was missing from the request
    pub component: String,
    /// Lifecycle status
    pub status: CalibrationStatus,
    /// Whether the calibration succeeded (or, for progress, is still healthy)
    pub success: bool,
    /// Device line or human-readable description
    pub message: String,
    /// Event time
    pub timestamp: DateTime<Utc>,
}

impl CalibrationOutcome {
    /// Failed outcome stamped now
    pub fn failed(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: CalibrationStatus::Failed,
            success: false,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Payload of raw command and sorting results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandReport {
    /// The command line sent to the device
    pub command: String,
    /// Whether the device completed the command without an error marker
    pub success: bool,
    /// Every line received for the command
    pub response: Vec<String>,
    /// Human-readable description
    pub message: String,
    /// Report time
    pub timestamp: DateTime<Utc>,
}

/// Payload of a work-process action reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkProcessResponse {
    /// The action that was requested
    pub action: String,
    /// Whether the action was accepted
    pub success: bool,
    /// Human-readable description
    pub message: String,
    /// Phase after the action
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<ProcessState>,
    /// Batch created by `start_batch`
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub batch: Option<Batch>,
    /// Statistics snapshot returned by `stop_processing`
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stats: Option<BatchStats>,
    /// Reply time
    pub timestamp: DateTime<Utc>,
}

impl WorkProcessResponse {
    /// Reply stamped now with no optional payload
    pub fn new(action: impl Into<String>, success: bool, message: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            success,
            message: message.into(),
            status: None,
            batch: None,
            stats: None,
            timestamp: Utc::now(),
        }
    }
}

/// Static facts about this server, sent in the welcome message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server version
    pub version: String,
    /// API flavour
    pub api_type: String,
    /// Calibratable components
    pub components: Vec<String>,
}

/// Welcome message payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Welcome {
    /// Greeting
    pub message: String,
    /// Static server facts
    pub server_info: ServerInfo,
    /// Feature descriptions keyed by feature name
    pub capabilities: BTreeMap<String, String>,
    /// Connect time
    pub timestamp: DateTime<Utc>,
}

/// Server section of the system status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStatus {
    /// Currently registered observers
    pub connected_clients: usize,
    /// Whether the server accepts connections
    pub running: bool,
    /// API flavour
    pub api_type: String,
    /// Server version
    pub version: String,
}

/// Components section of the system status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentsReport {
    /// Calibratable components
    pub supported: Vec<String>,
    /// Readiness of each tracked component
    pub status: BTreeMap<String, bool>,
    /// Detailed calibration state of every component seen so far
    pub calibration: BTreeMap<String, ComponentStatus>,
}

/// Payload of the `system_status` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    /// Rig controller link
    pub arduino: DeviceStatus,
    /// This server
    pub server: ServerStatus,
    /// Component readiness
    pub components: ComponentsReport,
    /// Work-process snapshot
    pub work_process: ProcessSnapshot,
    /// Report time
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_event_shape() {
        let value = serde_json::to_value(Event::error("Unknown message type: frobnicate")).unwrap();
        assert_eq!(
            value,
            json!({"type": "error", "message": "Unknown message type: frobnicate"})
        );
    }

    #[test]
    fn test_newtype_payload_is_flattened() {
        let event = Event::CalibrationResult(CalibrationOutcome::failed("HX711", "nope"));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "calibration_result");
        assert_eq!(value["component"], "HX711");
        assert_eq!(value["status"], "failed");
        assert_eq!(value["success"], false);
        assert!(value.get("timestamp").is_some());
    }

    #[test]
    fn test_process_update_omits_empty_payload() {
        let event = Event::ProcessUpdate {
            status: ProcessState::LoadEggs,
            message: "Loading".to_string(),
            stats: None,
            batch: None,
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["status"], "load_eggs");
        assert!(value.get("stats").is_none());
        assert!(value.get("batch").is_none());
    }

    #[test]
    fn test_configuration_result_uses_account_id_key() {
        let event = Event::ConfigurationResult {
            success: true,
            account_id: Some("acc-1".to_string()),
            message: "ok".to_string(),
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["accountId"], "acc-1");
    }

    #[test]
    fn test_kind_matches_wire_tag() {
        let events = vec![
            Event::pong(),
            Event::error("x"),
            Event::SortingProgress {
                message: "x".to_string(),
                timestamp: Utc::now(),
            },
            Event::ArduinoStatus {
                connected: false,
                port: None,
                message: "x".to_string(),
                timestamp: Utc::now(),
            },
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], event.kind());
        }
    }
}
