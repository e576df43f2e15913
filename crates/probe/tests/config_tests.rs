//! Integration tests for configuration parsing
//!
//! Tests probe configuration loading, including:
//! - Full and partial config files
//! - Defaults for missing tables and keys
//! - Invalid configuration handling
//! - Save/load through the filesystem

use probe::config::ProbeConfig;
use std::time::Duration;

const FULL_CONFIG: &str = r#"
[general]
log_level = "debug"

[usb]
pump_timeout_ms = 250
transfer_timeout_ms = 2000
drain_timeout_ms = 500
manufacturer_max_len = 64
"#;

#[test]
fn test_parse_full_config() {
    let config = ProbeConfig::from_toml(FULL_CONFIG).unwrap();

    assert_eq!(config.general.log_level, "debug");
    assert_eq!(config.usb.pump_timeout_ms, 250);
    assert_eq!(config.usb.transfer_timeout_ms, 2000);
    assert_eq!(config.usb.drain_timeout_ms, 500);
    assert_eq!(config.usb.manufacturer_max_len, 64);

    let settings = config.dispatcher_settings();
    assert_eq!(settings.pump_timeout, Duration::from_millis(250));
    assert_eq!(settings.drain_timeout, Duration::from_millis(500));
    assert_eq!(settings.probe.transfer_timeout, Duration::from_secs(2));
    assert_eq!(settings.probe.manufacturer_max_len, 64);
}

#[test]
fn test_empty_config_uses_defaults() {
    let config = ProbeConfig::from_toml("").unwrap();
    assert_eq!(config, ProbeConfig::default());
}

#[test]
fn test_partial_config_fills_defaults() {
    let config = ProbeConfig::from_toml(
        r#"
[usb]
transfer_timeout_ms = 1000
"#,
    )
    .unwrap();

    assert_eq!(config.general.log_level, "warn");
    assert_eq!(config.usb.transfer_timeout_ms, 1000);
    assert_eq!(config.usb.pump_timeout_ms, 100);
    assert_eq!(config.usb.manufacturer_max_len, 200);
}

#[test]
fn test_invalid_values_rejected() {
    let cases = [
        "[general]\nlog_level = \"loud\"\n",
        "[usb]\npump_timeout_ms = 0\n",
        "[usb]\ntransfer_timeout_ms = 0\n",
        "[usb]\nmanufacturer_max_len = 0\n",
        "[usb]\nmanufacturer_max_len = 1000\n",
    ];

    for case in cases {
        assert!(
            ProbeConfig::from_toml(case).is_err(),
            "expected rejection of {:?}",
            case
        );
    }
}

#[test]
fn test_malformed_toml_rejected() {
    assert!(ProbeConfig::from_toml("[usb\npump_timeout_ms = 1").is_err());
    assert!(ProbeConfig::from_toml("[usb]\npump_timeout_ms = \"fast\"\n").is_err());
}

#[test]
fn test_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("probe.toml");

    let mut config = ProbeConfig::default();
    config.general.log_level = "warn".to_string();
    config.usb.drain_timeout_ms = 0;
    config.save(&path).unwrap();

    let loaded = ProbeConfig::load(Some(path)).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_load_missing_explicit_path_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.toml");

    let err = ProbeConfig::load(Some(path)).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to read config file"));
}

#[test]
fn test_load_invalid_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("probe.toml");
    std::fs::write(&path, "[usb]\npump_timeout_ms = 0\n").unwrap();

    assert!(ProbeConfig::load(Some(path)).is_err());
}

#[test]
fn test_default_log_level_is_quiet() {
    let config = ProbeConfig::default();
    assert_eq!(config.general.log_level, "warn");
    assert!(config.validate().is_ok());
}

#[test]
fn test_fallback_to_defaults_reports_reason() {
    let dir = tempfile::tempdir().unwrap();
    let candidates = [dir.path().join("a.toml"), dir.path().join("b.toml")];

    let (config, fallback) = ProbeConfig::load_first_or_default(&candidates);
    assert_eq!(config, ProbeConfig::default());

    let reason = fallback.expect("fallback reason");
    assert!(format!("{:#}", reason).contains("No configuration file found"));
}

#[test]
fn test_fallback_on_invalid_file_reports_reason() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("probe.toml");
    std::fs::write(&path, "[usb]\nmanufacturer_max_len = 0\n").unwrap();

    let (config, fallback) = ProbeConfig::load_first_or_default(&[path]);
    assert_eq!(config, ProbeConfig::default());
    assert!(format!("{:#}", fallback.unwrap()).contains("manufacturer_max_len"));
}

#[test]
fn test_first_existing_candidate_wins() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.toml");
    let present = dir.path().join("present.toml");
    std::fs::write(&present, "[general]\nlog_level = \"debug\"\n").unwrap();

    let (config, fallback) = ProbeConfig::load_first_or_default(&[missing, present]);
    assert!(fallback.is_none());
    assert_eq!(config.general.log_level, "debug");
}
