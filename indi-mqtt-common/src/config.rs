use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// INDI server connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndiConfig {
    /// INDI server hostname or IP.
    #[serde(default = "default_indi_host")]
    pub host: String,

    /// INDI server port.
    #[serde(default = "default_indi_port")]
    pub port: u16,
}

fn default_indi_host() -> String {
    "localhost".to_string()
}

fn default_indi_port() -> u16 {
    7624
}

impl Default for IndiConfig {
    fn default() -> Self {
        Self {
            host: default_indi_host(),
            port: default_indi_port(),
        }
    }
}

/// MQTT broker connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP.
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    /// MQTT broker port.
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Broker username (optional).
    #[serde(default)]
    pub username: Option<String>,

    /// Broker password (optional).
    #[serde(default)]
    pub password: Option<String>,
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            username: None,
            password: None,
        }
    }
}

impl MqttConfig {
    /// Credentials as a pair, if both are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Load a configuration file in JSON5 format.
pub fn load_config<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    json5::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })
}

/// Load a configuration from a JSON5 string.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    json5::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indi_defaults() {
        let config: IndiConfig = parse_config("{}").unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 7624);
    }

    #[test]
    fn test_mqtt_defaults() {
        let config: MqttConfig = parse_config("{}").unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 1883);
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_mqtt_credentials() {
        let json5 = r#"
        {
            host: "broker.local",
            port: 8883,
            username: "astro",
            password: "secret",
        }
        "#;

        let config: MqttConfig = parse_config(json5).unwrap();
        assert_eq!(config.host, "broker.local");
        assert_eq!(config.port, 8883);
        assert_eq!(config.credentials(), Some(("astro", "secret")));
    }

    #[test]
    fn test_partial_credentials_ignored() {
        let config: MqttConfig = parse_config(r#"{ username: "astro" }"#).unwrap();
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_logging_json_format() {
        let json5 = r#"
        {
            level: "debug",
            format: "json",
        }
        "#;

        let config: LoggingConfig = parse_config(json5).unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
    }
}
