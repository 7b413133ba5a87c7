use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading config: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// What the driver does when more than one region hangs off the sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootPolicy {
    /// Process the first root found; log and report the others as skipped.
    #[default]
    First,
    /// Process every root.
    All,
}

/// Names of the region table and its columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionTable {
    pub table: String,
    pub id_column: String,
    pub parent_column: String,
    pub channel_total_column: String,
    pub channel_online_column: String,
    pub channel_broken_column: String,
    pub device_total_column: String,
    pub device_online_column: String,
    pub device_broken_column: String,
}

impl Default for RegionTable {
    fn default() -> Self {
        Self {
            table: "region".to_string(),
            id_column: "id".to_string(),
            parent_column: "parent_id".to_string(),
            channel_total_column: "channel_total".to_string(),
            channel_online_column: "channel_online".to_string(),
            channel_broken_column: "channel_broken".to_string(),
            device_total_column: "device_total".to_string(),
            device_online_column: "device_online".to_string(),
            device_broken_column: "device_broken".to_string(),
        }
    }
}

impl RegionTable {
    /// The six counter columns in the order of the `Counters` fields.
    pub fn counter_columns(&self) -> [&str; 6] {
        [
            self.channel_total_column.as_str(),
            self.channel_online_column.as_str(),
            self.channel_broken_column.as_str(),
            self.device_total_column.as_str(),
            self.device_online_column.as_str(),
            self.device_broken_column.as_str(),
        ]
    }
}

/// Names of a leaf table (channels or devices).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafTable {
    pub table: String,
    #[serde(default = "default_region_column")]
    pub region_column: String,
    #[serde(default = "default_status_column")]
    pub status_column: String,
}

fn default_region_column() -> String {
    "region_id".to_string()
}

fn default_status_column() -> String {
    "status".to_string()
}

impl LeafTable {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            region_column: default_region_column(),
            status_column: default_status_column(),
        }
    }
}

/// Status codes that mark a leaf row as online or broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusCodes {
    pub online: i64,
    pub broken: i64,
}

impl Default for StatusCodes {
    fn default() -> Self {
        Self {
            online: 2,
            broken: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollupConfig {
    pub region: RegionTable,
    pub channel: LeafTable,
    pub device: LeafTable,
    pub status: StatusCodes,
    pub root_sentinel: String,
    pub root_policy: RootPolicy,
    /// Wrap the write-back in a transaction when the store supports one.
    pub transactional: bool,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            region: RegionTable::default(),
            channel: LeafTable::new("channel"),
            device: LeafTable::new("device"),
            status: StatusCodes::default(),
            root_sentinel: "0".to_string(),
            root_policy: RootPolicy::default(),
            transactional: false,
        }
    }
}

impl RollupConfig {
    /// Reads a JSON config file. Missing keys take their default values.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: RollupConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.status.online == self.status.broken {
            return Err(ConfigError::Invalid(format!(
                "online and broken status codes are both {}",
                self.status.online
            )));
        }

        let names = [
            ("region.table", &self.region.table),
            ("region.id_column", &self.region.id_column),
            ("region.parent_column", &self.region.parent_column),
            ("channel.table", &self.channel.table),
            ("channel.region_column", &self.channel.region_column),
            ("channel.status_column", &self.channel.status_column),
            ("device.table", &self.device.table),
            ("device.region_column", &self.device.region_column),
            ("device.status_column", &self.device.status_column),
        ];
        if let Some((key, _)) = names.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("{key} must not be empty")));
        }
        if self.region.counter_columns().iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "region counter columns must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_values_are_sensible() {
        let cfg = RollupConfig::default();
        assert_eq!(cfg.region.table, "region");
        assert_eq!(cfg.channel.table, "channel");
        assert_eq!(cfg.device.region_column, "region_id");
        assert_eq!(cfg.status.online, 2);
        assert_eq!(cfg.status.broken, 1);
        assert_eq!(cfg.root_sentinel, "0");
        assert_eq!(cfg.root_policy, RootPolicy::First);
        assert!(!cfg.transactional);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("rollup.json");
        std::fs::write(
            &path,
            r#"{"root_sentinel": "-1", "root_policy": "all", "region": {"table": "areas"}}"#,
        )
        .unwrap();

        let cfg = RollupConfig::from_file(&path).unwrap();
        assert_eq!(cfg.root_sentinel, "-1");
        assert_eq!(cfg.root_policy, RootPolicy::All);
        assert_eq!(cfg.region.table, "areas");
        assert_eq!(cfg.region.id_column, "id");
        assert_eq!(cfg.channel, LeafTable::new("channel"));
    }

    #[test]
    fn clashing_status_codes_are_rejected() {
        let mut cfg = RollupConfig::default();
        cfg.status.broken = cfg.status.online;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("rollup.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            RollupConfig::from_file(&path),
            Err(ConfigError::ParseError(_))
        ));
    }
}
