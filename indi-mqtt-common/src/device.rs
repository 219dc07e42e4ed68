//! Device tree data model and type coercion.
//!
//! A snapshot of the INDI device tree is represented as a list of
//! [`Device`] values, each holding typed [`Property`] groups of
//! [`Element`] values. The coercion rules here turn protocol enum
//! states into the canonical payload strings used on MQTT topics.

use serde::{Deserialize, Serialize};

/// A single device in the tree snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    /// Device name as reported by the driver (not normalized).
    pub name: String,
    /// Driver interface bitmask, from the DRIVER_INTERFACE element
    /// of the DRIVER_INFO property.
    pub interface: u32,
    /// Properties in definition order.
    pub properties: Vec<Property>,
}

impl Device {
    /// Device category derived from the interface bitmask.
    pub fn category(&self) -> DeviceCategory {
        DeviceCategory::from_interface(self.interface)
    }
}

/// A named, typed group of elements.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// Property name, used verbatim as a topic segment (after lower-casing).
    pub name: String,
    /// Property kind.
    pub kind: PropertyKind,
    /// Elements in definition order.
    pub elements: Vec<Element>,
}

/// INDI property kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    Text,
    Number,
    Switch,
    Light,
    Blob,
}

impl PropertyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyKind::Text => "text",
            PropertyKind::Number => "number",
            PropertyKind::Switch => "switch",
            PropertyKind::Light => "light",
            PropertyKind::Blob => "blob",
        }
    }
}

/// A named value inside a property.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub value: ElementValue,
}

/// Typed raw element value.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    Text(String),
    Number(f64),
    Switch(SwitchState),
    Light(LightState),
    /// Binary payloads are never carried; only the byte size is kept.
    Blob {
        size: usize,
    },
}

/// Switch element state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    /// Canonical payload string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchState::On => "ON",
            SwitchState::Off => "OFF",
        }
    }

    /// Parse the INDI wire text ("On"/"Off", case-insensitive).
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "on" => Some(SwitchState::On),
            "off" => Some(SwitchState::Off),
            _ => None,
        }
    }
}

/// Light element state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightState {
    Idle,
    Ok,
    Busy,
    Alert,
}

impl LightState {
    /// Canonical payload string.
    pub fn as_str(&self) -> &'static str {
        match self {
            LightState::Idle => "IDLE",
            LightState::Ok => "OK",
            LightState::Busy => "BUSY",
            LightState::Alert => "ALERT",
        }
    }

    /// Parse the INDI wire text ("Idle"/"Ok"/"Busy"/"Alert", case-insensitive).
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "idle" => Some(LightState::Idle),
            "ok" => Some(LightState::Ok),
            "busy" => Some(LightState::Busy),
            "alert" => Some(LightState::Alert),
            _ => None,
        }
    }
}

/// Device categories derived from the driver interface bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceCategory {
    General,
    Telescope,
    Ccd,
    Guider,
    Focuser,
    Filter,
    Dome,
    Gps,
    Weather,
    Ao,
    Dustcap,
    Lightbox,
    Detector,
    Rotator,
    Spectrograph,
    Aux,
    Unknown,
}

/// Declared interface bits, least significant first. A driver may
/// advertise several bits; the first matching one wins. Bit 14 is
/// not assigned by the protocol.
const INTERFACE_BITS: [(u32, DeviceCategory); 15] = [
    (1 << 0, DeviceCategory::Telescope),
    (1 << 1, DeviceCategory::Ccd),
    (1 << 2, DeviceCategory::Guider),
    (1 << 3, DeviceCategory::Focuser),
    (1 << 4, DeviceCategory::Filter),
    (1 << 5, DeviceCategory::Dome),
    (1 << 6, DeviceCategory::Gps),
    (1 << 7, DeviceCategory::Weather),
    (1 << 8, DeviceCategory::Ao),
    (1 << 9, DeviceCategory::Dustcap),
    (1 << 10, DeviceCategory::Lightbox),
    (1 << 11, DeviceCategory::Detector),
    (1 << 12, DeviceCategory::Rotator),
    (1 << 13, DeviceCategory::Spectrograph),
    (1 << 15, DeviceCategory::Aux),
];

impl DeviceCategory {
    /// Map a driver interface bitmask to a category.
    ///
    /// A mask of 0 (no interface advertised) maps to `General`; a
    /// nonzero mask with none of the declared bits set maps to
    /// `Unknown`.
    pub fn from_interface(mask: u32) -> Self {
        if mask == 0 {
            return DeviceCategory::General;
        }
        for (bit, category) in INTERFACE_BITS {
            if mask & bit != 0 {
                return category;
            }
        }
        DeviceCategory::Unknown
    }

    /// Upper-case name used as the canonical document key.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceCategory::General => "GENERAL",
            DeviceCategory::Telescope => "TELESCOPE",
            DeviceCategory::Ccd => "CCD",
            DeviceCategory::Guider => "GUIDER",
            DeviceCategory::Focuser => "FOCUSER",
            DeviceCategory::Filter => "FILTER",
            DeviceCategory::Dome => "DOME",
            DeviceCategory::Gps => "GPS",
            DeviceCategory::Weather => "WEATHER",
            DeviceCategory::Ao => "AO",
            DeviceCategory::Dustcap => "DUSTCAP",
            DeviceCategory::Lightbox => "LIGHTBOX",
            DeviceCategory::Detector => "DETECTOR",
            DeviceCategory::Rotator => "ROTATOR",
            DeviceCategory::Spectrograph => "SPECTROGRAPH",
            DeviceCategory::Aux => "AUX",
            DeviceCategory::Unknown => "UNKNOWN",
        }
    }
}

/// Normalize a device name for use as a document key: whitespace runs
/// become underscores, the result is upper-cased.
pub fn normalize_device_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase()
}
