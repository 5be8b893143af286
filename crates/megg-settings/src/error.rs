//! Error types for the settings crate.
//!
//! This module provides structured error types for loading, saving and
//! validating the server configuration.

use std::io;
use thiserror::Error;

/// Errors that can occur during settings operations.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The configuration file could not be loaded.
    #[error("Failed to load settings: {0}")]
    LoadError(String),

    /// The configuration file could not be saved.
    #[error("Failed to save settings: {0}")]
    SaveError(String),

    /// A configuration value is invalid.
    #[error("Invalid setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("TOML error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    /// A configuration format or environment error occurred.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl SettingsError {
    /// Invalid setting with the given key
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl From<megg_core::ValidationError> for SettingsError {
    fn from(err: megg_core::ValidationError) -> Self {
        match err {
            megg_core::ValidationError::InvalidValue { field, reason } => {
                Self::InvalidSetting { key: field, reason }
            }
            other => Self::InvalidSetting {
                key: "config".to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// Errors related to configuration sources.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file format is not supported.
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// An environment override could not be parsed.
    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: String, value: String },

    /// No platform configuration directory exists.
    #[error("No configuration directory on this platform")]
    NoConfigDir,
}

/// Result type alias for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_error_display() {
        let err = SettingsError::LoadError("file not found".to_string());
        assert_eq!(err.to_string(), "Failed to load settings: file not found");

        let err = SettingsError::invalid("serial.baud_rate", "must be > 0");
        assert_eq!(
            err.to_string(),
            "Invalid setting 'serial.baud_rate': must be > 0"
        );
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::UnsupportedFormat("yaml".to_string());
        assert_eq!(err.to_string(), "Unsupported config format: yaml");

        let err = ConfigError::InvalidEnv {
            var: "PORT".to_string(),
            value: "eighty".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid value for PORT: eighty");
    }

    #[test]
    fn test_error_conversion() {
        let settings_err: SettingsError = ConfigError::NoConfigDir.into();
        assert!(matches!(settings_err, SettingsError::Config(_)));

        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let settings_err: SettingsError = io_err.into();
        assert!(matches!(settings_err, SettingsError::IoError(_)));

        let validation = megg_core::ValidationError::InvalidValue {
            field: "process.success_rate".to_string(),
            reason: "must be within 0..=1".to_string(),
        };
        let settings_err: SettingsError = validation.into();
        assert!(matches!(
            settings_err,
            SettingsError::InvalidSetting { ref key, .. } if key == "process.success_rate"
        ));
    }
}
