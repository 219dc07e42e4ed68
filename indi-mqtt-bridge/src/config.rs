//! Configuration for the INDI MQTT bridge.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use indi_mqtt_common::config::{IndiConfig, LoggingConfig, MqttConfig};
use indi_mqtt_common::topic::DEFAULT_ROOT;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// INDI server connection settings.
    #[serde(default)]
    pub indi: IndiConfig,

    /// MQTT broker connection settings.
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Publishing behavior.
    #[serde(default)]
    pub publish: PublishConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Publishing behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Root topic under which everything is published.
    #[serde(default = "default_root")]
    pub root: String,

    /// Polling interval in seconds; 0 means manual mode (publish only
    /// when a control message arrives on `<root>/poll`).
    #[serde(default = "default_polling_secs")]
    pub polling_secs: u64,

    /// Also publish the whole snapshot as one JSON document to
    /// `<root>/json` each cycle.
    #[serde(default)]
    pub json: bool,

    /// Print every published leaf topic to stdout (debug aid).
    #[serde(default)]
    pub list_topics: bool,
}

fn default_root() -> String {
    DEFAULT_ROOT.to_string()
}

fn default_polling_secs() -> u64 {
    10
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            polling_secs: default_polling_secs(),
            json: false,
            list_topics: false,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: BridgeConfig = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.publish.root.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Root topic cannot be empty".to_string(),
            ));
        }

        if self.publish.root.contains(['#', '+']) {
            return Err(ConfigError::Validation(format!(
                "Root topic '{}' must not contain MQTT wildcards",
                self.publish.root
            )));
        }

        if self.indi.host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "INDI host cannot be empty".to_string(),
            ));
        }

        if self.mqtt.host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "MQTT host cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
