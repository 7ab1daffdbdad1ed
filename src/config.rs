use crate::codec::SensorMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Channel metadata entry for the sensor map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorEntry {
    pub name: String,
    #[serde(default)]
    pub unit: String,
}

/// Runtime configuration for the logger daemon.
///
/// All fields have working defaults; a JSON config file overrides them
/// field by field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Identity sent in every frame.
    pub device_id: String,

    /// Remote collector endpoint for the network sink.
    pub collector_host: String,
    pub collector_port: u16,

    /// Reachability-probe target for the transport health check.
    pub probe_host: String,
    pub probe_port: u16,

    /// Channel count advertised in frames; parsed records are zero-filled
    /// or truncated to this width.
    pub total_channels: usize,

    /// Line queue between the serial reader and the pipeline.
    pub line_queue_depth: usize,
    pub max_line_bytes: usize,

    pub health_check_period_ms: u64,
    pub ack_timeout_ms: u64,
    pub io_timeout_ms: u64,
    pub lease_timeout_ms: u64,

    /// Root of the durable archive (the mounted storage card).
    pub archive_root: PathBuf,

    pub sensors: Vec<SensorEntry>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            device_id: "DL-0000".into(),
            collector_host: "127.0.0.1".into(),
            collector_port: 9000,
            probe_host: "8.8.8.8".into(),
            probe_port: 53,
            total_channels: 10,
            line_queue_depth: 16,
            max_line_bytes: 1024,
            health_check_period_ms: 5000,
            ack_timeout_ms: 5000,
            io_timeout_ms: 5000,
            lease_timeout_ms: 1000,
            archive_root: PathBuf::from("archive"),
            sensors: Vec::new(),
        }
    }
}

impl LoggerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        info!(path = %path.display(), device_id = %config.device_id, "configuration loaded");
        Ok(config)
    }

    pub fn sensor_map(&self) -> SensorMap {
        let mut map = SensorMap::new();
        for entry in &self.sensors {
            map.add(&entry.name, &entry.unit);
        }
        map
    }

    pub fn health_check_period(&self) -> Duration {
        Duration::from_millis(self.health_check_period_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn lease_timeout(&self) -> Duration {
        Duration::from_millis(self.lease_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = LoggerConfig::default();
        assert_eq!(config.total_channels, 10);
        assert_eq!(config.line_queue_depth, 16);
        assert_eq!(config.health_check_period(), Duration::from_secs(5));
        assert!(config.sensors.is_empty());
    }

    #[test]
    fn test_partial_json_overrides_defaults() {
        let config: LoggerConfig = serde_json::from_str(
            r#"{"device_id":"DL-0042","total_channels":5,
                "sensors":[{"name":"Temperature","unit":"C"},{"name":"Humidity"}]}"#,
        )
        .unwrap();
        assert_eq!(config.device_id, "DL-0042");
        assert_eq!(config.total_channels, 5);
        assert_eq!(config.collector_port, 9000);
        let map = config.sensor_map();
        assert_eq!(map.len(), 2);
    }
}
