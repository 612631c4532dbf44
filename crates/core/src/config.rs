//! Configuration management for SkyRelay.
//!
//! Every section has defaults, so an empty TOML document is a valid
//! configuration.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Command gateway settings
    pub gateway: GatewayConfig,
    /// Reply dispatcher settings
    pub dispatcher: DispatcherConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Command gateway settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Default time to wait for a device reply
    pub command_timeout_ms: u64,
    /// Number of lock shards in the correlation registry
    pub registry_shards: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: 10_000,
            registry_shards: 16,
        }
    }
}

impl GatewayConfig {
    /// Command timeout as a [`Duration`]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// Reply dispatcher settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Worker tasks draining the inbound reply queue
    pub workers: usize,
    /// Capacity of the inbound reply queue
    pub queue_depth: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_depth: 1024,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load and validate a TOML configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the runtime cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.gateway.command_timeout_ms == 0 {
            return Err(CoreError::Config(
                "gateway.command_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.gateway.registry_shards == 0 {
            return Err(CoreError::Config(
                "gateway.registry_shards must be greater than zero".to_string(),
            ));
        }
        if self.dispatcher.workers == 0 {
            return Err(CoreError::Config(
                "dispatcher.workers must be greater than zero".to_string(),
            ));
        }
        if self.dispatcher.queue_depth == 0 {
            return Err(CoreError::Config(
                "dispatcher.queue_depth must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
