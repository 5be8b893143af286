//! MEGG Settings Crate
//!
//! Loads the server configuration from TOML or JSON, applies environment
//! overrides and validates the result.

pub mod config;
pub mod error;

pub use config::{CalibrationSettings, Config, SerialSettings, ServerSettings};
pub use error::{ConfigError, SettingsError, SettingsResult};
