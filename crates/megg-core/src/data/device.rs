//! Live status of the serial-attached rig controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection and lifecycle status of the rig controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    /// Whether the serial link is open
    pub connected: bool,
    /// Port of the open link, or of the last successful link
    pub port: Option<String>,
    /// Configured baud rate
    pub baud_rate: u32,
    /// Host platform, for diagnostics
    pub platform: String,
    /// When the device last sent any line
    pub last_ping: Option<DateTime<Utc>>,
    /// When the last successful status probe happened
    pub last_probe: Option<DateTime<Utc>>,
    /// Set by `SYSTEM_STARTED`, cleared by `SYSTEM_STOPPED`/`STOP_ACK`
    pub system_active: bool,
}

impl DeviceStatus {
    /// Disconnected status for the given baud rate
    pub fn disconnected(baud_rate: u32) -> Self {
        Self {
            connected: false,
            port: None,
            baud_rate,
            platform: std::env::consts::OS.to_string(),
            last_ping: None,
            last_probe: None,
            system_active: false,
        }
    }
}
