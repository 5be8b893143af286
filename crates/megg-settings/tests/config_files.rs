//! Configuration file round trips through the filesystem

use megg_settings::{Config, ConfigError, SettingsError};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_save_and_load_toml() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("megg.toml");

    let mut config = Config::default();
    config.server.port = 9001;
    config.serial.link.port = Some("/dev/ttyACM0".to_string());
    config.serial.simulate = true;
    config.calibration.strict = true;
    config.save_to_file(&path).unwrap();

    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_save_and_load_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("megg.json");

    let mut config = Config::default();
    config.process.success_rate = 0.5;
    config.save_to_file(&path).unwrap();

    assert_eq!(Config::load_from_file(&path).unwrap(), config);
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("partial.toml");
    fs::write(
        &path,
        "[server]\nport = 8800\n\n[serial]\nport = \"COM7\"\nbaud_rate = 57600\n",
    )
    .unwrap();

    let config = Config::load_from_file(&path).unwrap();
    assert_eq!(config.server.port, 8800);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.serial.link.port.as_deref(), Some("COM7"));
    assert_eq!(config.serial.link.baud_rate, 57600);
    assert_eq!(config.serial.link.settle_ms, 2000);
    assert_eq!(config.protocol.calibration.timeout_ms, 15_000);
}

#[test]
fn test_invalid_file_contents() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[serial]\nbaud_rate = 0\n").unwrap();
    assert!(matches!(
        Config::load_from_file(&path),
        Err(SettingsError::InvalidSetting { .. })
    ));

    fs::write(&path, "this is not toml = = =").unwrap();
    assert!(matches!(
        Config::load_from_file(&path),
        Err(SettingsError::TomlError(_))
    ));
}

#[test]
fn test_unsupported_extension() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("megg.yaml");
    fs::write(&path, "server: {}").unwrap();
    assert!(matches!(
        Config::load_from_file(&path),
        Err(SettingsError::Config(ConfigError::UnsupportedFormat(_)))
    ));
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        Config::load_from_file(&dir.path().join("absent.toml")),
        Err(SettingsError::LoadError(_))
    ));
}
