//! MQTT bridge for the INDI device-control protocol.
//!
//! The bridge connects to an INDI server, snapshots the device tree on
//! every poll cycle and republishes it as a hierarchy of MQTT topics:
//!
//! ```text
//! <root>/<category>/<device>/<property>/<element>
//! ```
//!
//! Plus three well-known topics under the root:
//! - `<root>/status` - "ON"/"OFF" mirror of the INDI link state
//! - `<root>/poll` - inbound control topic; a non-negative integer
//!   payload sets the polling interval in seconds (0 = manual mode)
//! - `<root>/json` - optional aggregate snapshot as one JSON document

pub mod bridge;
pub mod config;
pub mod indi;
pub mod mqtt;
pub mod poll;
pub mod publish;
pub mod supervisor;
