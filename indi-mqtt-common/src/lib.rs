//! INDI MQTT Common Library
//!
//! This crate provides the protocol-independent core of the INDI-to-MQTT
//! bridge:
//!
//! - [`device`] - Device tree data model (devices, properties, elements)
//!   and type coercion (switch/light states, interface bitmask categories)
//! - [`flatten`] - Projection of a device tree into a canonical document
//! - [`topic`] - MQTT topic path construction
//! - [`config`] - Configuration primitives and JSON5 loading
//! - [`error`] - Error types

pub mod config;
pub mod device;
pub mod error;
pub mod flatten;
pub mod topic;

// Re-export commonly used types at the crate root
pub use config::{IndiConfig, LogFormat, LoggingConfig, MqttConfig, load_config, parse_config};
pub use device::{
    Device, DeviceCategory, Element, ElementValue, LightState, Property, PropertyKind, SwitchState,
    normalize_device_name,
};
pub use error::{Error, Result};
pub use flatten::{CanonicalDocument, CanonicalValue, flatten};
pub use topic::TopicBuilder;

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
