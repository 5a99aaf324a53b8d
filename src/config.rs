// ABOUTME: Daemon configuration parsing: bus selection, logging, poll periods and the static device list
// ABOUTME: Reads a TOML file where every field is optional; a missing file means all defaults

use crate::daemon::PollIntervals;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/modemd/modemd.toml";

/// Environment variable overriding the configuration path.
pub const CONFIG_ENV: &str = "MODEMD_CONFIG";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BusKind {
    #[default]
    System,
    Session,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub bus: BusKind,
    /// Fallback filter when `RUST_LOG` is not set
    pub log_level: String,
    pub rssi_interval_secs: u64,
    pub registration_interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let intervals = PollIntervals::default();
        Self {
            bus: BusKind::default(),
            log_level: "info".to_string(),
            rssi_interval_secs: intervals.rssi.as_secs(),
            registration_interval_secs: intervals.registration.as_secs(),
        }
    }
}

impl DaemonConfig {
    pub fn poll_intervals(&self) -> PollIntervals {
        PollIntervals::default()
            .with_rssi(Duration::from_secs(self.rssi_interval_secs))
            .with_registration(Duration::from_secs(self.registration_interval_secs))
    }
}

/// A modem announced to the daemon, as a hotplug layer would.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Stable identifier, usually the sysfs path
    pub udi: String,
    pub vendor_id: u16,
    pub product_id: u16,
    /// Candidate serial ports in enumeration order
    pub ports: Vec<PathBuf>,
    /// Force a plugin by name instead of looking it up by ids
    pub plugin: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub daemon: DaemonConfig,
    #[serde(rename = "device")]
    pub devices: Vec<DeviceConfig>,
}

impl Config {
    pub fn parse(toml_str: &str) -> Result<Config> {
        toml::from_str(toml_str).context("failed to parse modemd config")
    }

    /// Load `path`. A file that does not exist yields the defaults.
    pub fn load(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Config::parse(&content).with_context(|| format!("failed to parse {}", path.display()))
    }
}

/// Configuration path: the first argument, else `MODEMD_CONFIG`, else the
/// default location.
pub fn config_path(arg: Option<String>, env: Option<String>) -> PathBuf {
    arg.or(env)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
