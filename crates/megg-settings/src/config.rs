//! Configuration and settings management for MEGG
//!
//! Provides configuration file handling, environment overrides and
//! validation. Supports JSON and TOML file formats; the default file lives
//! in the platform configuration directory.
//!
//! Configuration is organized into logical sections:
//! - Server settings (bind address)
//! - Serial settings (port, baud rate, probe timings, simulation)
//! - Protocol budgets per command class
//! - Work-process timings and probabilities
//! - Calibration policy

use megg_communication::{Budgets, ConfirmationPolicy, ConnectionParams};
use megg_core::ProcessConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ConfigError, SettingsError, SettingsResult};

/// WebSocket server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8765,
        }
    }
}

impl ServerSettings {
    /// `host:port` string for binding
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Port, baud rate and probe timings
    #[serde(flatten)]
    pub link: ConnectionParams,
    /// Talk to the in-process virtual controller instead of hardware
    pub simulate: bool,
}

/// Calibration settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Require an explicit completion marker from the device
    pub strict: bool,
}

impl CalibrationSettings {
    /// Confirmation policy for the calibration router
    pub fn policy(&self) -> ConfirmationPolicy {
        if self.strict {
            ConfirmationPolicy::Strict
        } else {
            ConfirmationPolicy::Lenient
        }
    }
}

/// Complete server configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// WebSocket server
    pub server: ServerSettings,
    /// Serial link
    pub serial: SerialSettings,
    /// Read budgets per command class
    pub protocol: Budgets,
    /// Simulated work process
    pub process: ProcessConfig,
    /// Calibration
    pub calibration: CalibrationSettings,
}

impl Config {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a `.json` or `.toml` file
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SettingsError::LoadError(format!("{}: {}", path.display(), e))
        })?;

        let config: Self = match extension(path) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            other => {
                return Err(ConfigError::UnsupportedFormat(
                    other.unwrap_or("none").to_string(),
                )
                .into())
            }
        };

        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a `.json` or `.toml` file
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match extension(path) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("toml") => toml::to_string_pretty(self)?,
            other => {
                return Err(ConfigError::UnsupportedFormat(
                    other.unwrap_or("none").to_string(),
                )
                .into())
            }
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Default configuration file path
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("megg").join("config.toml"))
            .ok_or_else(|| ConfigError::NoConfigDir.into())
    }

    /// Load from `path`, or from the default path when it exists
    ///
    /// Falls back to defaults when no path is given and no default file
    /// exists. Environment overrides are applied either way.
    pub fn load(path: Option<&Path>) -> SettingsResult<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::default_path() {
                Ok(default) if default.exists() => Self::load_from_file(&default)?,
                _ => {
                    tracing::debug!("No configuration file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> SettingsResult<()> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from any variable source
    ///
    /// Recognized variables: `HOST`, `PORT`, `ARDUINO_PORT`,
    /// `ARDUINO_BAUDRATE`, `ARDUINO_TIMEOUT` (seconds) and `MEGG_SIMULATE`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> SettingsResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = parse_var("PORT", &port)?;
        }
        if let Some(port) = lookup("ARDUINO_PORT") {
            let port = port.trim().to_string();
            self.serial.link.port = (!port.is_empty()).then_some(port);
        }
        if let Some(baud) = lookup("ARDUINO_BAUDRATE") {
            self.serial.link.baud_rate = parse_var("ARDUINO_BAUDRATE", &baud)?;
        }
        if let Some(timeout) = lookup("ARDUINO_TIMEOUT") {
            let secs: f64 = parse_var("ARDUINO_TIMEOUT", &timeout)?;
            if !(secs.is_finite() && secs > 0.0) {
                return Err(ConfigError::InvalidEnv {
                    var: "ARDUINO_TIMEOUT".to_string(),
                    value: timeout,
                }
                .into());
            }
            self.serial.link.read_timeout_ms = (secs * 1000.0).round() as u64;
        }
        if let Some(simulate) = lookup("MEGG_SIMULATE") {
            self.serial.simulate = match simulate.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: "MEGG_SIMULATE".to_string(),
                        value: simulate,
                    }
                    .into())
                }
            };
        }
        self.validate()
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        if self.server.host.trim().is_empty() {
            return Err(SettingsError::invalid("server.host", "must not be empty"));
        }
        if self.server.port == 0 {
            return Err(SettingsError::invalid("server.port", "must be > 0"));
        }

        let link = &self.serial.link;
        if link.baud_rate == 0 {
            return Err(SettingsError::invalid("serial.baud_rate", "must be > 0"));
        }
        if link.read_timeout_ms == 0 {
            return Err(SettingsError::invalid(
                "serial.read_timeout_ms",
                "must be > 0",
            ));
        }
        if link.probe_timeout_ms == 0 {
            return Err(SettingsError::invalid(
                "serial.probe_timeout_ms",
                "must be > 0",
            ));
        }

        self.protocol.validate()?;
        self.process.validate()?;
        Ok(())
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}

fn parse_var<T: FromStr>(var: &str, value: &str) -> SettingsResult<T> {
    value.trim().parse().map_err(|_| {
        ConfigError::InvalidEnv {
            var: var.to_string(),
            value: value.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.bind_address(), "0.0.0.0:8765");
        assert_eq!(config.serial.link.baud_rate, 9600);
        assert_eq!(config.serial.link.read_timeout_ms, 1000);
        assert!(!config.serial.simulate);
        assert_eq!(config.calibration.policy(), ConfirmationPolicy::Lenient);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[
                ("HOST", "127.0.0.1"),
                ("PORT", "9000"),
                ("ARDUINO_PORT", "/dev/ttyACM0"),
                ("ARDUINO_BAUDRATE", "115200"),
                ("ARDUINO_TIMEOUT", "2.5"),
                ("MEGG_SIMULATE", "yes"),
            ]))
            .unwrap();

        assert_eq!(config.server.bind_address(), "127.0.0.1:9000");
        assert_eq!(config.serial.link.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.serial.link.baud_rate, 115200);
        assert_eq!(config.serial.link.read_timeout_ms, 2500);
        assert!(config.serial.simulate);
    }

    #[test]
    fn test_bad_env_values_are_rejected() {
        let mut config = Config::default();
        let err = config.apply_overrides(env(&[("PORT", "eighty")])).unwrap_err();
        assert_eq!(err.to_string(), "Config error: Invalid value for PORT: eighty");

        assert!(config
            .apply_overrides(env(&[("ARDUINO_TIMEOUT", "-1")]))
            .is_err());
        assert!(config
            .apply_overrides(env(&[("MEGG_SIMULATE", "maybe")]))
            .is_err());
        assert!(config
            .apply_overrides(env(&[("ARDUINO_BAUDRATE", "0")]))
            .is_err());
    }

    #[test]
    fn test_validate_rejects_bad_probability() {
        let mut config = Config::default();
        config.process.success_rate = 1.5;
        assert!(matches!(
            config.validate(),
            Err(SettingsError::InvalidSetting { ref key, .. }) if key == "success_rate"
        ));
    }

    #[test]
    fn test_strict_policy() {
        let config = Config {
            calibration: CalibrationSettings { strict: true },
            ..Default::default()
        };
        assert_eq!(config.calibration.policy(), ConfirmationPolicy::Strict);
    }
}
