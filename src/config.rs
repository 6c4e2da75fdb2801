// Copyright (c) 2025 - Cowboy AI, Inc.
//! Configuration for gathering and transports
//!
//! Every config has a `Default` and a `from_env()` constructor. All of them
//! also deserialize with serde so they can be embedded in a larger config
//! file; missing fields take the default.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{QuorumError, QuorumResult};
use crate::gather::majority;

/// How long and for how many replies a gather waits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatherConfig {
    /// Accepted replies needed; `None` means a majority of the peers asked
    #[serde(default)]
    pub target: Option<usize>,

    /// Deadline in milliseconds, relative to the start of the gather
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
}

fn default_deadline_ms() -> u64 {
    2_000
}

impl Default for GatherConfig {
    fn default() -> Self {
        Self {
            target: None,
            deadline_ms: default_deadline_ms(),
        }
    }
}

impl GatherConfig {
    /// Load configuration from `QUORUM_TARGET` and `QUORUM_DEADLINE_MS`
    pub fn from_env() -> QuorumResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            target: env_parse("QUORUM_TARGET")?,
            deadline_ms: env_parse("QUORUM_DEADLINE_MS")?.unwrap_or(defaults.deadline_ms),
        })
    }

    /// The deadline as a `Duration`
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    /// Target for a fan-out to `peers` peers
    pub fn target_for(&self, peers: usize) -> usize {
        self.target.unwrap_or_else(|| majority(peers))
    }
}

/// Settings for the line-delimited JSON RPC transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Address of the remote service (e.g. "127.0.0.1:51000")
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_addr() -> String {
    "127.0.0.1:51000".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl TransportConfig {
    /// Load configuration from `WEATHER_RPC_ADDR` and `WEATHER_CONNECT_TIMEOUT_MS`
    pub fn from_env() -> QuorumResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            addr: std::env::var("WEATHER_RPC_ADDR").unwrap_or(defaults.addr),
            connect_timeout_ms: env_parse("WEATHER_CONNECT_TIMEOUT_MS")?
                .unwrap_or(defaults.connect_timeout_ms),
        })
    }

    /// The connection timeout as a `Duration`
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Configuration for NATS connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// NATS server URLs
    pub servers: Vec<String>,
    /// Client name
    pub name: String,
    /// Prefix for request subjects; a call to `method` goes to `{prefix}.{method}`
    pub subject_prefix: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Request timeout
    ///
    /// Keep this longer than any gather deadline: the deadline, not the
    /// transport, decides when to stop waiting.
    pub request_timeout: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            name: "cim-quorum".to_string(),
            subject_prefix: "quorum".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl NatsConfig {
    /// Load configuration from `NATS_URL` (comma separated) and `NATS_SUBJECT_PREFIX`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let servers = std::env::var("NATS_URL")
            .map(|urls| urls.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or(defaults.servers);
        let subject_prefix =
            std::env::var("NATS_SUBJECT_PREFIX").unwrap_or(defaults.subject_prefix);

        Self {
            servers,
            subject_prefix,
            ..defaults
        }
    }
}

/// Parse an optional environment variable
fn env_parse<T>(key: &str) -> QuorumResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| QuorumError::Configuration(format!("{key}={raw}: {e}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_config_default() {
        let config = GatherConfig::default();

        assert_eq!(config.target, None);
        assert_eq!(config.deadline(), Duration::from_secs(2));
        assert_eq!(config.target_for(10), 6);
    }

    #[test]
    fn test_explicit_target_wins() {
        let config = GatherConfig {
            target: Some(9),
            deadline_ms: 300,
        };

        assert_eq!(config.target_for(10), 9);
        assert_eq!(config.deadline(), Duration::from_millis(300));
    }

    #[test]
    fn test_gather_config_deserialize_defaults() {
        let config: GatherConfig = serde_json::from_str(r#"{"target": 4}"#).unwrap();

        assert_eq!(config.target, Some(4));
        assert_eq!(config.deadline_ms, 2_000);
    }

    #[test]
    fn test_transport_config_default() {
        let config = TransportConfig::default();

        assert_eq!(config.addr, "127.0.0.1:51000");
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_nats_config_default() {
        let config = NatsConfig::default();

        assert_eq!(config.servers, vec!["nats://localhost:4222"]);
        assert_eq!(config.name, "cim-quorum");
        assert_eq!(config.subject_prefix, "quorum");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_nats_config_deserialize_defaults() {
        let config: NatsConfig =
            serde_json::from_str(r#"{"subject_prefix": "weather"}"#).unwrap();

        assert_eq!(config.subject_prefix, "weather");
        assert_eq!(config.servers, vec!["nats://localhost:4222"]);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_env_parse_rejects_garbage() {
        std::env::set_var("CIM_QUORUM_TEST_GARBAGE", "not-a-number");

        let parsed: QuorumResult<Option<u64>> = env_parse("CIM_QUORUM_TEST_GARBAGE");

        assert!(matches!(parsed, Err(QuorumError::Configuration(_))));
    }

    #[test]
    fn test_env_parse_missing_is_none() {
        let parsed: Option<u64> = env_parse("CIM_QUORUM_TEST_UNSET_VARIABLE").unwrap();
        assert_eq!(parsed, None);
    }
}
