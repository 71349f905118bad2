//! Outline Configuration
//!
//! JSON configuration for the sync engine and the action log. Every field
//! has a default, so an empty object (or a missing file) is a valid config.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlineConfig {
    pub sync: SyncConfig,
    pub history: HistoryConfig,
}

impl OutlineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Configuration with retry delays disabled
    pub fn immediate() -> Self {
        Self {
            sync: SyncConfig {
                retry_base_delay_ms: 0,
                retry_max_delay_ms: 0,
            },
            ..Self::default()
        }
    }
}

/// Retry policy of the sync worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Delay before the first retry of a failed operation
    pub retry_base_delay_ms: u64,
    /// Upper bound for the exponential backoff
    pub retry_max_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 30_000,
        }
    }
}

impl SyncConfig {
    /// Delay before retrying an operation that has failed `attempts` times
    pub fn backoff(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        let factor = 1u64 << (attempts - 1).min(16);
        let millis = self
            .retry_base_delay_ms
            .saturating_mul(factor)
            .min(self.retry_max_delay_ms);
        Duration::from_millis(millis)
    }
}

/// Undo history limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum undo levels (0 = unlimited)
    pub max_levels: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_levels: 100 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = OutlineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, OutlineConfig::default());
        assert_eq!(config.history.max_levels, 100);
    }

    #[test]
    fn test_partial_override() {
        let config =
            OutlineConfig::from_json_str(r#"{"sync": {"retry_base_delay_ms": 10}}"#).unwrap();
        assert_eq!(config.sync.retry_base_delay_ms, 10);
        assert_eq!(config.sync.retry_max_delay_ms, 30_000);
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let sync = SyncConfig {
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 1_000,
        };
        assert_eq!(sync.backoff(0), Duration::ZERO);
        assert_eq!(sync.backoff(1), Duration::from_millis(100));
        assert_eq!(sync.backoff(3), Duration::from_millis(400));
        assert_eq!(sync.backoff(10), Duration::from_millis(1_000));
        assert_eq!(OutlineConfig::immediate().sync.backoff(5), Duration::ZERO);
    }

    #[test]
    fn test_load_missing_file_and_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("outline.json");
        assert_eq!(OutlineConfig::load(&missing).unwrap(), OutlineConfig::default());

        std::fs::write(&missing, "{ not json").unwrap();
        assert!(matches!(OutlineConfig::load(&missing), Err(ConfigError::Parse(_))));
    }
}
