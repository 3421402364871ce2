//! Per-stage configuration, modeled on a TOML-loading `Config::load` shape,
//! re-targeted from network-topology/digitizer settings to the fields one
//! `runtime::StageConfig` needs: socket addresses, tick periods, and an
//! opaque `initial_config` value handed to `StageHooks`.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::runtime::{StageConfig, DEFAULT_BASE_PERIOD, DEFAULT_HIGH_WATER_MARK, DEFAULT_PUBLISH_PERIOD};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

/// On-disk shape of a stage's `-f <config_file>`. Every socket address is
/// optional: a stage not using a given socket role (e.g. a pure source has
/// no `data_sub_connect`) simply leaves it unset.
#[derive(Debug, Clone, Deserialize)]
pub struct StageFileConfig {
    #[serde(default)]
    pub module_name: Option<String>,
    #[serde(default)]
    pub status_bind: Option<String>,
    #[serde(default)]
    pub data_pub_bind: Option<String>,
    #[serde(default)]
    pub data_sub_connect: Option<String>,
    #[serde(default)]
    pub data_sub_topic: Option<String>,
    #[serde(default)]
    pub command_pull_bind: Option<String>,
    #[serde(default)]
    pub base_period_ms: Option<u64>,
    #[serde(default)]
    pub publish_period_secs: Option<u64>,
    #[serde(default)]
    pub high_water_mark: Option<usize>,
    /// Stage-specific settings, handed verbatim to `StageHooks::read_config`
    /// (digitizer channel tables, coincidence windows, histogram bounds,
    /// replay file paths, whatever the stage in question needs).
    #[serde(default = "default_device")]
    pub device: toml::Value,
}

fn default_device() -> toml::Value {
    toml::Value::Table(toml::value::Table::new())
}

impl Default for StageFileConfig {
    fn default() -> Self {
        StageFileConfig {
            module_name: None,
            status_bind: None,
            data_pub_bind: None,
            data_sub_connect: None,
            data_sub_topic: None,
            command_pull_bind: None,
            base_period_ms: None,
            publish_period_secs: None,
            high_water_mark: None,
            device: default_device(),
        }
    }
}

impl StageFileConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Builds a `runtime::StageConfig`, falling back to the runtime's
    /// defaults and the given module name for anything left unset.
    pub fn into_stage_config(self, default_module_name: &str) -> StageConfig {
        let device_json: Value = serde_json::to_value(&self.device).unwrap_or(Value::Null);
        StageConfig {
            module_name: self.module_name.unwrap_or_else(|| default_module_name.to_string()),
            status_bind: self.status_bind,
            data_pub_bind: self.data_pub_bind,
            data_sub_connect: self.data_sub_connect,
            data_sub_topic: self.data_sub_topic,
            command_pull_bind: self.command_pull_bind,
            base_period: self.base_period_ms.map(Duration::from_millis).unwrap_or(DEFAULT_BASE_PERIOD),
            publish_period: self
                .publish_period_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_PUBLISH_PERIOD),
            high_water_mark: self.high_water_mark.unwrap_or(DEFAULT_HIGH_WATER_MARK),
            initial_config: device_json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_falls_back_to_defaults() {
        let cfg = StageFileConfig::from_toml("").unwrap().into_stage_config("abcd");
        assert_eq!(cfg.module_name, "abcd");
        assert_eq!(cfg.base_period, DEFAULT_BASE_PERIOD);
        assert_eq!(cfg.publish_period, DEFAULT_PUBLISH_PERIOD);
        assert_eq!(cfg.high_water_mark, DEFAULT_HIGH_WATER_MARK);
        assert!(cfg.status_bind.is_none());
    }

    #[test]
    fn full_config_overrides_every_field() {
        let toml = r#"
module_name = "abcd0"
status_bind = "tcp://*:16180"
data_pub_bind = "tcp://*:16181"
command_pull_bind = "tcp://*:16182"
base_period_ms = 20
publish_period_secs = 5
high_water_mark = 2048

[device]
channels = 16
"#;
        let cfg = StageFileConfig::from_toml(toml).unwrap().into_stage_config("fallback");
        assert_eq!(cfg.module_name, "abcd0");
        assert_eq!(cfg.status_bind.as_deref(), Some("tcp://*:16180"));
        assert_eq!(cfg.base_period, Duration::from_millis(20));
        assert_eq!(cfg.publish_period, Duration::from_secs(5));
        assert_eq!(cfg.high_water_mark, 2048);
        assert_eq!(cfg.initial_config["channels"], 16);
    }
}
