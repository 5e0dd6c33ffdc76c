// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Monitor configuration.
//!
//! Built from command-line flags or loaded from a TOML file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use ctrlbox::{ManagerConfig, TcpEndpoint, DEFAULT_PREFIXES};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Minimum spacing between connection attempts (seconds).
    #[serde(default = "default_retry_period")]
    pub retry_period_secs: u64,

    /// Pause between two facade updates (milliseconds).
    #[serde(default = "default_update_interval")]
    pub update_interval_ms: u64,

    /// Bound on waiting for a worker to stop (seconds).
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Service subtype browsed for TCP controllers.
    #[serde(default = "default_service_type")]
    pub service_type: String,

    /// Serial device discovery.
    #[serde(default)]
    pub serial: SerialConfig,

    /// Known TCP controllers.
    #[serde(default)]
    pub tcp: Vec<TcpConfig>,

    /// Controllers run as local processes.
    #[serde(default)]
    pub process: Vec<ProcessConfig>,
}

fn default_retry_period() -> u64 {
    5
}

fn default_update_interval() -> u64 {
    100
}

fn default_stop_timeout() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_type() -> String {
    "ctrlbox".to_string()
}

fn default_true() -> bool {
    true
}

fn default_device_dir() -> PathBuf {
    PathBuf::from("/dev")
}

fn default_prefixes() -> Vec<String> {
    DEFAULT_PREFIXES.iter().map(|p| p.to_string()).collect()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            retry_period_secs: default_retry_period(),
            update_interval_ms: default_update_interval(),
            stop_timeout_secs: default_stop_timeout(),
            log_level: default_log_level(),
            service_type: default_service_type(),
            serial: SerialConfig::default(),
            tcp: Vec::new(),
            process: Vec::new(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // zero would let every worker spin on a refusing controller
        if self.retry_period_secs == 0 {
            return Err(ConfigError::Invalid(
                "retry_period_secs must be greater than zero".into(),
            ));
        }

        if self.update_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "update_interval_ms must be greater than zero".into(),
            ));
        }

        if !self.serial.enabled && self.tcp.is_empty() && self.process.is_empty() {
            return Err(ConfigError::Invalid("No discovery configured".into()));
        }

        if self.serial.enabled && self.serial.prefixes.is_empty() {
            return Err(ConfigError::Invalid(
                "Serial discovery enabled without device prefixes".into(),
            ));
        }

        if !self.tcp.is_empty() && self.service_type.is_empty() {
            return Err(ConfigError::Invalid("Empty service type".into()));
        }

        for (i, tcp) in self.tcp.iter().enumerate() {
            if tcp.host.is_empty() {
                return Err(ConfigError::Invalid(format!("TCP entry {} has empty host", i)));
            }
            if tcp.port == 0 {
                return Err(ConfigError::Invalid(format!(
                    "TCP entry {} ({}) has port 0",
                    i, tcp.host
                )));
            }
        }

        for (i, process) in self.process.iter().enumerate() {
            if process.path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Process entry {} has empty path",
                    i
                )));
            }
        }

        Ok(())
    }

    /// Connection manager settings.
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig::default()
            .with_retry_period(Duration::from_secs(self.retry_period_secs))
            .with_stop_timeout(Duration::from_secs(self.stop_timeout_secs))
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

/// Serial device discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Scan for serial devices.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory holding the device nodes.
    #[serde(default = "default_device_dir")]
    pub dir: PathBuf,

    /// Device name prefixes.
    #[serde(default = "default_prefixes")]
    pub prefixes: Vec<String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_device_dir(),
            prefixes: default_prefixes(),
        }
    }
}

/// A known TCP controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpConfig {
    pub host: String,
    pub port: u16,
}

impl TcpConfig {
    /// Parse `HOST:PORT`.
    pub fn parse(address: &str) -> Result<Self, ConfigError> {
        let (host, port) = address.rsplit_once(':').ok_or_else(|| {
            ConfigError::Invalid(format!("Invalid TCP address: {} (expected HOST:PORT)", address))
        })?;
        let port = port
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("Invalid TCP port in {}", address)))?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    pub fn endpoint(&self) -> TcpEndpoint {
        TcpEndpoint::new(self.host.clone(), self.port)
    }
}

/// A controller started as a local process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Executable path.
    pub path: PathBuf,

    /// Command-line arguments.
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}
