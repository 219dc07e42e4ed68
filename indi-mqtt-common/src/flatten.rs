//! Flattening of a device tree snapshot into the canonical document.
//!
//! The canonical document is a four-level map: category -> device name
//! -> property name -> element name -> scalar. It is rebuilt wholesale
//! on every poll cycle; there is no incremental diffing.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::device::{Device, ElementValue, normalize_device_name};

/// A scalar value after type coercion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CanonicalValue {
    Text(String),
    Number(f64),
}

impl CanonicalValue {
    /// Coerce a raw element value. Total: every element value has a
    /// canonical representation, binary data becomes a placeholder.
    pub fn from_element(value: &ElementValue) -> Self {
        match value {
            ElementValue::Text(text) => CanonicalValue::Text(text.clone()),
            ElementValue::Number(n) => CanonicalValue::Number(*n),
            ElementValue::Switch(state) => CanonicalValue::Text(state.as_str().to_string()),
            ElementValue::Light(state) => CanonicalValue::Text(state.as_str().to_string()),
            ElementValue::Blob { size } => {
                CanonicalValue::Text(format!("<blob {} bytes>", size))
            }
        }
    }
}

impl fmt::Display for CanonicalValue {
    /// Payload rendering. Numbers use the plain decimal `f64` display
    /// form, never scientific notation, so topic consumers can parse
    /// them back.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanonicalValue::Text(text) => f.write_str(text),
            CanonicalValue::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Elements of one property, keyed by element name.
pub type ElementMap = BTreeMap<String, CanonicalValue>;
/// Properties of one device, keyed by property name.
pub type PropertyMap = BTreeMap<String, ElementMap>;
/// Devices of one category, keyed by normalized device name.
pub type DeviceMap = BTreeMap<String, PropertyMap>;

/// The whole-tree snapshot: category -> device -> property -> element
/// -> scalar. Ordered maps keep traversal and serialization
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CanonicalDocument(pub BTreeMap<String, DeviceMap>);

/// One leaf of the canonical document, borrowed during traversal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leaf<'a> {
    pub category: &'a str,
    pub device: &'a str,
    pub property: &'a str,
    pub element: &'a str,
    pub value: &'a CanonicalValue,
}

impl CanonicalDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one leaf value, creating intermediate maps as needed.
    /// Devices of the same category merge under one category key.
    pub fn insert(
        &mut self,
        category: &str,
        device: &str,
        property: &str,
        element: &str,
        value: CanonicalValue,
    ) {
        self.0
            .entry(category.to_string())
            .or_default()
            .entry(device.to_string())
            .or_default()
            .entry(property.to_string())
            .or_default()
            .insert(element.to_string(), value);
    }

    /// Iterate every leaf in deterministic (sorted) order.
    pub fn leaves(&self) -> impl Iterator<Item = Leaf<'_>> {
        self.0.iter().flat_map(|(category, devices)| {
            devices.iter().flat_map(move |(device, properties)| {
                properties.iter().flat_map(move |(property, elements)| {
                    elements.iter().map(move |(element, value)| Leaf {
                        category,
                        device,
                        property,
                        element,
                        value,
                    })
                })
            })
        })
    }

    /// Total number of leaf values.
    pub fn leaf_count(&self) -> usize {
        self.leaves().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serialize the whole document as a JSON string.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Project a device tree snapshot into a canonical document.
///
/// Pure: no state is retained between calls, and flattening the same
/// tree twice yields identical documents. A device with no properties
/// contributes an empty device map, not an error.
pub fn flatten(devices: &[Device]) -> CanonicalDocument {
    let mut doc = CanonicalDocument::new();

    for device in devices {
        let category = device.category();
        let device_name = normalize_device_name(&device.name);

        // Make empty devices visible in the document.
        doc.0
            .entry(category.as_str().to_string())
            .or_default()
            .entry(device_name.clone())
            .or_default();

        for property in &device.properties {
            for element in &property.elements {
                doc.insert(
                    category.as_str(),
                    &device_name,
                    &property.name,
                    &element.name,
                    CanonicalValue::from_element(&element.value),
                );
            }
        }
    }

    doc
}
