use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::engine::QueuePolicy;
use crate::error::{Result, TrackerError};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 6555;

/// Client configuration.
///
/// Every field has a default, so a JSON document only needs to name what it
/// overrides:
///
/// ```json
/// { "host": "10.0.0.7", "request_timeout_ms": 2000, "queue": { "policy": "unbounded" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub host: String,
    pub port: u16,
    /// Bound on TCP connect plus the negotiation round trip.
    pub connect_timeout_ms: u64,
    /// Bound on every pull-mode request/response.
    pub request_timeout_ms: u64,
    /// Bound on waiting for the push listener to stop.
    pub shutdown_timeout_ms: u64,
    /// Treat a push stream that stays silent this long as lost.
    pub idle_timeout_ms: Option<u64>,
    /// Protocol version to request after connecting.
    pub protocol_version: Option<u32>,
    /// Send heartbeats while pushing, at the interval the server asks for.
    pub heartbeat: bool,
    pub queue: QueuePolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 5_000,
            shutdown_timeout_ms: 10_000,
            idle_timeout_ms: None,
            protocol_version: None,
            heartbeat: true,
            queue: QueuePolicy::default(),
        }
    }
}

impl TrackerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn from_json(config: Value) -> Result<Self> {
        let config: Self =
            serde_json::from_value(config).map_err(|e| TrackerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| TrackerError::Config(format!("cannot read {:?}: {}", path, e)))?;
        let value: Value = serde_json::from_str(&json)
            .map_err(|e| TrackerError::Config(format!("cannot parse {:?}: {}", path, e)))?;
        Self::from_json(value)
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| TrackerError::Config(e.to_string()))?;
        fs::write(path, json)
            .map_err(|e| TrackerError::Config(format!("cannot write {:?}: {}", path, e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(TrackerError::Config("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(TrackerError::Config("port must not be 0".to_string()));
        }
        if let QueuePolicy::DropOldest { capacity: 0 } = self.queue {
            return Err(TrackerError::Config("queue capacity must be at least 1".to_string()));
        }
        Ok(())
    }

    /// `host:port` string for socket connection.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.address(), "localhost:6555");
        assert!(config.heartbeat);
        assert_eq!(config.idle_timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = TrackerConfig::from_json(json!({
            "host": "10.0.0.7",
            "request_timeout_ms": 250
        }))
        .unwrap();

        assert_eq!(config.host, "10.0.0.7");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.request_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_validation() {
        assert!(TrackerConfig::from_json(json!({"port": 0})).is_err());
        assert!(TrackerConfig::from_json(json!({"host": " "})).is_err());
        assert!(TrackerConfig::from_json(
            json!({"queue": {"policy": "drop_oldest", "capacity": 0}})
        )
        .is_err());
    }
}
