use thiserror::Error;

/// Common error type for the INDI MQTT bridge.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("INDI protocol error: {0}")]
    Indi(String),

    #[error("MQTT error: {0}")]
    Mqtt(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid topic: {0}")]
    Topic(String),
}

/// Result type alias using the bridge's Error.
pub type Result<T> = std::result::Result<T, Error>;
