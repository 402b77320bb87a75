//! TOML-based application configuration.
//!
//! Stores the local identity (supplied by the external identity
//! collaborator) and executor tuning. Stored at `<data_dir>/config.toml`;
//! every field has a serde default so a partial or missing file loads
//! cleanly.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::store::data_dir;

/// Identity of the local user, as provided by the identity collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_user_name")]
    pub user_name: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            user_name: default_user_name(),
        }
    }
}

/// Reservation executor tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Due-scan lookahead in seconds (covers scheduler jitter).
    #[serde(default = "default_lookahead_secs")]
    pub lookahead_secs: i64,
    /// Upper bound on the skew-compensation sleep, in seconds.
    #[serde(default = "default_skew_wait_cap_secs")]
    pub skew_wait_cap_secs: i64,
    /// Cadence of the watch loop, in seconds.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            lookahead_secs: default_lookahead_secs(),
            skew_wait_cap_secs: default_skew_wait_cap_secs(),
            tick_interval_secs: default_tick_interval_secs(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

impl Config {
    pub fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("<data_dir>"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load the configuration, falling back to defaults when no file exists.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }
}

fn default_user_id() -> String {
    std::env::var("USER").unwrap_or_else(|_| "local".to_string())
}

fn default_user_name() -> String {
    default_user_id()
}

fn default_lookahead_secs() -> i64 {
    crate::executor::DEFAULT_LOOKAHEAD_SECS
}

fn default_skew_wait_cap_secs() -> i64 {
    crate::executor::DEFAULT_SKEW_WAIT_CAP_SECS
}

fn default_tick_interval_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_loads_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.executor.lookahead_secs, 60);
        assert_eq!(config.executor.skew_wait_cap_secs, 15);
        assert_eq!(config.executor.tick_interval_secs, 60);
        assert!(!config.identity.user_id.is_empty());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config: Config = toml::from_str(
            "[identity]\nuser_id = \"u1\"\nuser_name = \"Alice\"\n\n[executor]\nlookahead_secs = 90\n",
        )
        .unwrap();
        assert_eq!(config.identity.user_id, "u1");
        assert_eq!(config.executor.lookahead_secs, 90);
        assert_eq!(config.executor.skew_wait_cap_secs, 15);
    }

    #[test]
    fn roundtrip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.executor.tick_interval_secs, config.executor.tick_interval_secs);
    }
}
