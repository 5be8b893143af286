//! Serial link to the rig controller
//!
//! Provides:
//! - Connection parameters and candidate port ordering
//! - The [`serial::SerialPort`] abstraction over real and virtual ports
//! - The [`device_link::DeviceLink`] owning the single open connection
//! - An in-process [`virtual_port::VirtualDevice`] emulating the firmware

pub mod device_link;
pub mod serial;
pub mod virtual_port;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters for opening and probing the serial link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionParams {
    /// Preferred port; the platform default is used when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Baud rate
    pub baud_rate: u32,
    /// Longest wait for a single line during normal reads, in milliseconds
    pub read_timeout_ms: u64,
    /// Wait after opening a port while the board resets, in milliseconds
    pub settle_ms: u64,
    /// Wait for the first line of the status probe, in milliseconds
    pub probe_timeout_ms: u64,
    /// Wait between writing a command and starting to read, in milliseconds
    pub command_settle_ms: u64,
    /// Ports tried after the preferred and enumerated ones
    pub fallback_ports: Vec<String>,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
            read_timeout_ms: 1000,
            settle_ms: 2000,
            probe_timeout_ms: 1000,
            command_settle_ms: 100,
            fallback_ports: default_fallback_ports(),
        }
    }
}

impl ConnectionParams {
    /// Preferred port, or the platform default
    pub fn preferred_port(&self) -> String {
        self.port.clone().unwrap_or_else(default_port)
    }

    /// Read timeout as a `Duration`
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Settle interval as a `Duration`
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Probe wait as a `Duration`
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Command settle delay as a `Duration`
    pub fn command_settle(&self) -> Duration {
        Duration::from_millis(self.command_settle_ms)
    }

    /// Ordered, deduplicated list of ports to try
    ///
    /// Order: the last port that worked, then the preferred port, then
    /// enumerated ports, then fallbacks.
    pub fn candidates(&self, last_good: Option<&str>, enumerated: &[String]) -> Vec<String> {
        let preferred = self.preferred_port();
        let mut ordered: Vec<String> = Vec::new();
        let all = last_good
            .into_iter()
            .chain(std::iter::once(preferred.as_str()))
            .chain(enumerated.iter().map(String::as_str))
            .chain(self.fallback_ports.iter().map(String::as_str));
        for port in all {
            let port = port.trim();
            if !port.is_empty() && !ordered.iter().any(|p| p == port) {
                ordered.push(port.to_string());
            }
        }
        ordered
    }
}

/// Platform default port of the rig controller
pub fn default_port() -> String {
    if cfg!(target_os = "windows") {
        "COM3".to_string()
    } else if cfg!(target_os = "macos") {
        "/dev/cu.usbserial-0001".to_string()
    } else {
        "/dev/ttyUSB0".to_string()
    }
}

/// Platform fallback ports
pub fn default_fallback_ports() -> Vec<String> {
    let ports: &[&str] = if cfg!(target_os = "windows") {
        &["COM3", "COM4", "COM5", "COM6", "COM7", "COM8", "COM9", "COM10"]
    } else if cfg!(target_os = "macos") {
        &["/dev/cu.usbserial-0001", "/dev/cu.usbserial-0002"]
    } else {
        &[
            "/dev/ttyUSB0",
            "/dev/ttyUSB1",
            "/dev/ttyUSB2",
            "/dev/ttyACM0",
            "/dev/ttyACM1",
            "/dev/ttyACM2",
        ]
    };
    ports.iter().map(|p| p.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_are_ordered_and_deduplicated() {
        let params = ConnectionParams {
            port: Some("/dev/ttyACM0".to_string()),
            fallback_ports: vec!["/dev/ttyUSB0".to_string(), "/dev/ttyACM0".to_string()],
            ..Default::default()
        };
        let enumerated = vec!["/dev/ttyUSB0".to_string(), "/dev/ttyUSB3".to_string()];

        let candidates = params.candidates(Some("/dev/ttyUSB3"), &enumerated);
        assert_eq!(
            candidates,
            vec!["/dev/ttyUSB3", "/dev/ttyACM0", "/dev/ttyUSB0"]
        );
    }

    #[test]
    fn test_candidates_skip_blank_entries() {
        let params = ConnectionParams {
            port: Some("  ".to_string()),
            fallback_ports: vec!["COM9".to_string(), String::new()],
            ..Default::default()
        };
        assert_eq!(params.candidates(None, &[]), vec!["COM9"]);
    }
}
