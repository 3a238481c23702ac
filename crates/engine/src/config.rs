//! Shard configuration via `stepshard.toml`
//!
//! Every knob has a default, so an empty file (or no file at all) yields a
//! working shard. `default_toml()` is the commented template written out for
//! operators to edit.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use stepshard_core::{Error, Limits, MAX_WRITE_KEY_SIZE};

/// Config file name
pub const CONFIG_FILE_NAME: &str = "stepshard.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("Config file '{path}': {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File content is not valid TOML for this config
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// Config could not be rendered as TOML
    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    /// A value is out of range
    #[error("Invalid config value for '{key}': {reason}")]
    Invalid {
        /// Offending key
        key: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::InvalidOperation(e.to_string())
    }
}

/// How a transaction is executed, fixed when the transaction starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxExecutionMode {
    /// Prepared operation sets are persisted before PREPARED is reported
    Persistent,
    /// Short-lived in-memory execution; cannot take part in the
    /// prepare/plan protocol
    Volatile,
}

impl TxExecutionMode {
    /// True if the mode can execute a PREPARE write
    pub fn supports_prepare(self) -> bool {
        matches!(self, TxExecutionMode::Persistent)
    }
}

/// Shard configuration loaded from `stepshard.toml`.
///
/// # Example
///
/// ```toml
/// data_tx_cache_size = 64
/// step_window_width = 30000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardConfig {
    /// Prepared transactions kept deserialized in memory; 0 disables caching.
    pub data_tx_cache_size: usize,
    /// Largest accepted serialized row key, in bytes.
    pub max_write_key_size: usize,
    /// Steps between `min_step` and `max_step` of a prepared window.
    pub step_window_width: u64,
    /// How long clients wait for an asynchronous result, in milliseconds.
    pub plan_wait_timeout_ms: u64,
    /// How long an unclaimed asynchronous result stays buffered, in
    /// milliseconds.
    pub result_retention_ms: u64,
    /// Run transactions in volatile mode. Not supported by the distributed
    /// write path.
    pub enable_volatile_transactions: bool,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            data_tx_cache_size: 64,
            max_write_key_size: MAX_WRITE_KEY_SIZE,
            step_window_width: 30_000,
            plan_wait_timeout_ms: 5000,
            result_retention_ms: 60_000,
            enable_volatile_transactions: false,
        }
    }
}

impl ShardConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# stepshard shard configuration
#
# Prepared transactions kept deserialized in memory (default: 64).
# 0 disables the cache; every plan then deserializes the stored copy.
data_tx_cache_size = 64

# Largest accepted serialized row key, in bytes (default: 1049600)
max_write_key_size = 1049600

# Width of the step window reported with PREPARED, in steps (default: 30000)
step_window_width = 30000

# How long clients wait for a planned result, in milliseconds (default: 5000)
plan_wait_timeout_ms = 5000

# How long a result nobody claimed stays buffered, in milliseconds
# (default: 60000)
result_retention_ms = 60000

# Volatile transactions cannot be used with the prepare/plan write path.
enable_volatile_transactions = false
"#
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ShardConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.step_window_width == 0 {
            return Err(ConfigError::Invalid {
                key: "step_window_width",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_write_key_size == 0 {
            return Err(ConfigError::Invalid {
                key: "max_write_key_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Execution mode for a transaction starting now
    pub fn execution_mode(&self) -> TxExecutionMode {
        if self.enable_volatile_transactions {
            TxExecutionMode::Volatile
        } else {
            TxExecutionMode::Persistent
        }
    }

    /// Request limits derived from this config
    pub fn limits(&self) -> Limits {
        Limits {
            max_key_bytes: self.max_write_key_size,
        }
    }

    /// Client wait timeout
    pub fn plan_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.plan_wait_timeout_ms)
    }

    /// Retention of unclaimed asynchronous results
    pub fn result_retention(&self) -> Duration {
        Duration::from_millis(self.result_retention_ms)
    }
}
