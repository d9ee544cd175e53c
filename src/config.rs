use std::env;
use std::path::Path;
use std::time::Duration;

use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_DEVICE_NAME: &str = "SAJ Sununo";
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 3;
pub const DEFAULT_STORAGE_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("SAJ_HOST is not set")]
    MissingHost,
    #[error("host must not be empty")]
    EmptyHost,
    #[error("{name} is not a valid interval: {value:?}")]
    InvalidInterval { name: &'static str, value: String },
    #[error("intervals must be non-zero")]
    ZeroInterval,
    #[error("scan interval must be shorter than the storage interval")]
    IntervalOrder,
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Monitor configuration as accepted at the setup boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Host or host:port of the inverter's local web interface.
    pub host: String,
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// How often a raw sample is fetched.
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    /// How often the averaged snapshot is published.
    #[serde(default = "default_storage_interval")]
    pub storage_interval_secs: u64,
}

fn default_device_name() -> String {
    DEFAULT_DEVICE_NAME.to_string()
}

fn default_scan_interval() -> u64 {
    DEFAULT_SCAN_INTERVAL_SECS
}

fn default_storage_interval() -> u64 {
    DEFAULT_STORAGE_INTERVAL_SECS
}

impl MonitorConfig {
    /// Configuration for a host with all other settings at their defaults.
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            device_name: default_device_name(),
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
            storage_interval_secs: DEFAULT_STORAGE_INTERVAL_SECS,
        }
    }

    /// Reads configuration from `SAJ_HOST`, `SAJ_DEVICE_NAME`,
    /// `SAJ_SCAN_INTERVAL` and `SAJ_STORAGE_INTERVAL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("SAJ_HOST").map_err(|_| ConfigError::MissingHost)?;
        let config = Self {
            host,
            device_name: env::var("SAJ_DEVICE_NAME").unwrap_or_else(|_| default_device_name()),
            scan_interval_secs: interval_from_env("SAJ_SCAN_INTERVAL", DEFAULT_SCAN_INTERVAL_SECS)?,
            storage_interval_secs: interval_from_env(
                "SAJ_STORAGE_INTERVAL",
                DEFAULT_STORAGE_INTERVAL_SECS,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reads configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.scan_interval_secs == 0 || self.storage_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.scan_interval_secs >= self.storage_interval_secs {
            return Err(ConfigError::IntervalOrder);
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn storage_interval(&self) -> Duration {
        Duration::from_secs(self.storage_interval_secs)
    }
}

fn interval_from_env(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidInterval {
            name,
            value,
        }),
        Err(_) => Ok(default),
    }
}
