//! Probe configuration management

use crate::dispatcher::DispatcherSettings;
use crate::worker::{MANUFACTURER_BUFFER_LEN, ProbeSettings};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default)]
    pub general: GeneralSettings,
    #[serde(default)]
    pub usb: UsbSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "GeneralSettings::default_log_level")]
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

impl GeneralSettings {
    // Lower levels would mix progress messages into the stderr diagnostics
    fn default_log_level() -> String {
        "warn".to_string()
    }
}

/// USB timing and buffer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Upper bound on one event pump call, in milliseconds
    #[serde(default = "UsbSettings::default_pump_timeout")]
    pub pump_timeout_ms: u64,
    /// Timeout of the AOA_GET_PROTOCOL transfer, in milliseconds
    #[serde(default = "UsbSettings::default_transfer_timeout")]
    pub transfer_timeout_ms: u64,
    /// How long shutdown waits for running probes, in milliseconds
    #[serde(default = "UsbSettings::default_drain_timeout")]
    pub drain_timeout_ms: u64,
    /// Longest manufacturer string kept, in bytes
    #[serde(default = "UsbSettings::default_manufacturer_max_len")]
    pub manufacturer_max_len: usize,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            pump_timeout_ms: Self::default_pump_timeout(),
            transfer_timeout_ms: Self::default_transfer_timeout(),
            drain_timeout_ms: Self::default_drain_timeout(),
            manufacturer_max_len: Self::default_manufacturer_max_len(),
        }
    }
}

impl UsbSettings {
    fn default_pump_timeout() -> u64 {
        100
    }

    fn default_transfer_timeout() -> u64 {
        5000
    }

    fn default_drain_timeout() -> u64 {
        3000
    }

    fn default_manufacturer_max_len() -> usize {
        MANUFACTURER_BUFFER_LEN
    }
}

impl ProbeConfig {
    /// Load configuration from the specified path, or from the first
    /// standard location that exists
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        match path {
            Some(p) => Self::load_file(&p),
            None => Self::load_first(&Self::candidate_paths()),
        }
    }

    /// Standard configuration locations, in lookup order
    pub fn candidate_paths() -> Vec<PathBuf> {
        vec![
            Self::default_path(),
            PathBuf::from("/etc/aoa-probe/probe.toml"),
        ]
    }

    /// Load the first of `candidates` that exists
    pub fn load_first(candidates: &[PathBuf]) -> Result<Self> {
        let config_path = candidates
            .iter()
            .find(|p| p.exists())
            .ok_or_else(|| anyhow!("No configuration file found"))?;

        Self::load_file(config_path)
    }

    fn load_file(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        Self::from_toml(&content)
            .with_context(|| format!("Failed to load config file: {}", config_path.display()))
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ProbeConfig = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the standard locations or fall back to defaults
    ///
    /// Runs before logging is set up, so the reason for a fallback is
    /// returned for the caller to log.
    pub fn load_or_default() -> (Self, Option<anyhow::Error>) {
        Self::load_first_or_default(&Self::candidate_paths())
    }

    pub fn load_first_or_default(candidates: &[PathBuf]) -> (Self, Option<anyhow::Error>) {
        match Self::load_first(candidates) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("aoa-probe").join("probe.toml")
        } else {
            PathBuf::from(".config/aoa-probe/probe.toml")
        }
    }

    /// Runtime settings for the dispatcher and its workers
    pub fn dispatcher_settings(&self) -> DispatcherSettings {
        DispatcherSettings {
            pump_timeout: Duration::from_millis(self.usb.pump_timeout_ms),
            drain_timeout: Duration::from_millis(self.usb.drain_timeout_ms),
            probe: ProbeSettings {
                transfer_timeout: Duration::from_millis(self.usb.transfer_timeout_ms),
                manufacturer_max_len: self.usb.manufacturer_max_len,
            },
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.general.log_level,
                valid_levels.join(", ")
            ));
        }

        // Zero would turn the pump loop into a busy spin
        if self.usb.pump_timeout_ms == 0 {
            return Err(anyhow!("pump_timeout_ms must be greater than 0"));
        }

        // libusb treats zero as "wait forever"
        if self.usb.transfer_timeout_ms == 0 {
            return Err(anyhow!("transfer_timeout_ms must be greater than 0"));
        }

        if !(1..=255).contains(&self.usb.manufacturer_max_len) {
            return Err(anyhow!(
                "manufacturer_max_len must be between 1 and 255, got {}",
                self.usb.manufacturer_max_len
            ));
        }

        Ok(())
    }
}

/// Expand `~` in a user-supplied config path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProbeConfig::default();
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.usb.pump_timeout_ms, 100);
        assert_eq!(config.usb.transfer_timeout_ms, 5000);
        assert_eq!(config.usb.drain_timeout_ms, 3000);
        assert_eq!(config.usb.manufacturer_max_len, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = ProbeConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: ProbeConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = ProbeConfig::default();
        config.general.log_level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.general.log_level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_timeouts() {
        let mut config = ProbeConfig::default();
        config.usb.pump_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ProbeConfig::default();
        config.usb.transfer_timeout_ms = 0;
        assert!(config.validate().is_err());

        // Not waiting for workers at all is allowed
        let mut config = ProbeConfig::default();
        config.usb.drain_timeout_ms = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_dispatcher_settings() {
        let mut config = ProbeConfig::default();
        config.usb.pump_timeout_ms = 50;
        config.usb.transfer_timeout_ms = 1500;

        let settings = config.dispatcher_settings();
        assert_eq!(settings.pump_timeout, Duration::from_millis(50));
        assert_eq!(settings.probe.transfer_timeout, Duration::from_millis(1500));
        assert_eq!(settings.drain_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_expand_path() {
        assert_eq!(
            expand_path("/etc/aoa-probe/probe.toml"),
            PathBuf::from("/etc/aoa-probe/probe.toml")
        );
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path("~/probe.toml"), home.join("probe.toml"));
        }
    }
}
