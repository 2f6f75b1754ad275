//! Loopback run configuration.
//!
//! Read from the JSON file named by `VANTAGE_CONFIG`; missing fields take
//! their defaults, and without the variable the defaults are used whole.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vantage_client::{ClientConfig, InterpolationConfig};
use vantage_server::ServerConfig;

pub const CONFIG_ENV: &str = "VANTAGE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopbackConfig {
    /// Fallback filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Ticks of scripted input.
    pub ticks: u64,
    /// Idle ticks after the script, letting acknowledgements catch up.
    pub settle_ticks: u64,
    /// One-way delay of the simulated link.
    pub latency_ticks: u64,
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub interpolation: InterpolationConfig,
    /// Where to write the owning session's replay.
    pub replay_path: Option<PathBuf>,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            ticks: 600,
            settle_ticks: 150,
            latency_ticks: 5,
            server: ServerConfig {
                record_replays: true,
                ..ServerConfig::default()
            },
            client: ClientConfig::default(),
            interpolation: InterpolationConfig::default(),
            replay_path: None,
        }
    }
}

impl LoopbackConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(Path::new(&path)),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        assert_eq!(LoopbackConfig::from_json("{}").unwrap(), LoopbackConfig::default());
    }

    #[test]
    fn test_partial_nested_override() {
        let config = LoopbackConfig::from_json(
            r#"{ "latency_ticks": 12, "client": { "snap_distance": 0.5 }, "server": { "sim": { "tick_rate_hz": 60 } } }"#,
        )
        .unwrap();
        assert_eq!(config.latency_ticks, 12);
        assert_eq!(config.client.snap_distance, 0.5);
        assert_eq!(config.client.max_queue_depth, 50);
        assert_eq!(config.server.sim.tick_rate_hz, 60);
        assert_eq!(config.server.max_sessions, 16);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = LoopbackConfig::from_file(Path::new("/nonexistent/vantage.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/vantage.json"));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(LoopbackConfig::from_json("{ \"ticks\": \"many\" }").is_err());
    }
}
