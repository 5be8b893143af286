//! Inbound client messages.
//!
//! Frames are JSON objects with a `"type"` discriminator. Parsing happens in
//! two steps so an unknown type can be told apart from a malformed payload.

use serde::Deserialize;
use serde_json::Value;

/// Reply text for frames that are not a JSON object of a known shape
pub const INVALID_JSON: &str = "Invalid JSON format";

/// A parsed client request
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Liveness check
    Ping,
    /// Calibrate one component
    CalibrationRequest {
        /// Component identifier
        #[serde(default)]
        component: Option<String>,
        /// Optional reference weight; numbers and numeric strings are accepted
        #[serde(default)]
        weight: Option<Value>,
    },
    /// Full system status
    GetStatus,
    /// Work-process action
    WorkProcess {
        /// `start_batch`, `stop_processing`, `reset_process` or `get_status`
        #[serde(default)]
        action: Option<String>,
        /// Batch identifier for `start_batch`
        #[serde(default)]
        batch_id: Option<String>,
        /// Egg count for `start_batch`, a number or a numeric string
        #[serde(default)]
        egg_count: Option<Value>,
    },
    /// Store a client configuration
    SetConfiguration {
        /// Owning account
        #[serde(default, rename = "accountId")]
        account_id: Option<String>,
        /// Opaque configuration payload
        #[serde(default)]
        configurations: Option<Value>,
    },
    /// Pass a raw line to the device
    SendCommand {
        /// The line
        #[serde(default)]
        command: Option<String>,
    },
    /// Run a sorting cycle
    StartSorting {
        /// Weight ranges passed to the device
        #[serde(default)]
        ranges: Option<Vec<String>>,
    },
    /// Stop the sorting cycle
    StopSorting,
}

/// Why a frame could not be turned into a [`ClientMessage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Not JSON, not an object, or a known type with a malformed payload
    InvalidJson,
    /// Well-formed object with an unrecognized `type`
    UnknownType(String),
}

impl ParseError {
    /// Text sent back in the error reply
    pub fn message(&self) -> String {
        match self {
            Self::InvalidJson => INVALID_JSON.to_string(),
            Self::UnknownType(kind) => format!("Unknown message type: {}", kind),
        }
    }
}

const KNOWN_TYPES: [&str; 8] = [
    "ping",
    "calibration_request",
    "get_status",
    "work_process",
    "set_configuration",
    "send_command",
    "start_sorting",
    "stop_sorting",
];

/// Parse one text frame
pub fn parse(text: &str) -> Result<ClientMessage, ParseError> {
    let value: Value = serde_json::from_str(text).map_err(|_| ParseError::InvalidJson)?;
    let Some(object) = value.as_object() else {
        return Err(ParseError::InvalidJson);
    };

    let kind = match object.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        Some(other) => other.to_string(),
        None => "null".to_string(),
    };
    if !KNOWN_TYPES.contains(&kind.as_str()) {
        return Err(ParseError::UnknownType(kind));
    }

    serde_json::from_value(value).map_err(|e| {
        tracing::debug!("Malformed {} message: {}", kind, e);
        ParseError::InvalidJson
    })
}

/// Interpret a weight given as a number or a numeric string
pub fn weight_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Interpret an egg count given as an integer, an integral float or a numeric string
pub fn count_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}
