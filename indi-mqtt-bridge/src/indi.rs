//! INDI device-control client.
//!
//! Connects to an INDI server over TCP, requests the property tree
//! with `<getProperties>` and keeps a live snapshot of it by folding
//! the server's XML stream (`def*Vector`, `set*Vector`, `delProperty`)
//! into a shared device map. The bridge reads that snapshot once per
//! poll cycle; it never writes to devices.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tokio::io::{AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use indi_mqtt_common::device::{Device, Element, ElementValue, LightState, Property, PropertyKind, SwitchState};
use indi_mqtt_common::error::{Error, Result};

/// Abstraction over the device-control link consumed by the bridge
/// loop. Implemented by [`IndiClient`] and by test doubles.
pub trait DeviceSource {
    /// Attempt to establish the link. An error means the attempt
    /// failed and may be retried.
    fn connect(&mut self) -> impl Future<Output = Result<()>>;

    /// Tear the link down.
    fn disconnect(&mut self) -> impl Future<Output = ()>;

    /// Whether the link is currently up.
    fn is_connected(&self) -> bool;

    /// Snapshot of the current device tree.
    fn devices(&self) -> Vec<Device>;
}

/// Live device tree shared between the stream reader task and the
/// bridge loop.
#[derive(Debug, Default)]
struct Shared {
    connected: AtomicBool,
    devices: Mutex<BTreeMap<String, DeviceEntry>>,
}

#[derive(Debug, Default, Clone)]
struct DeviceEntry {
    interface: u32,
    properties: BTreeMap<String, Property>,
}

impl Shared {
    fn lock_devices(&self) -> MutexGuard<'_, BTreeMap<String, DeviceEntry>> {
        self.devices.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// INDI TCP client.
pub struct IndiClient {
    host: String,
    port: u16,
    shared: Arc<Shared>,
    writer: Option<OwnedWriteHalf>,
    reader_task: Option<JoinHandle<()>>,
}

impl IndiClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            shared: Arc::new(Shared::default()),
            writer: None,
            reader_task: None,
        }
    }
}

impl DeviceSource for IndiClient {
    async fn connect(&mut self) -> Result<()> {
        self.disconnect().await;

        let addr = format!("{}:{}", self.host, self.port);
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| Error::Indi(format!("Connection to {} failed: {}", addr, e)))?;

        let (rd, mut wr) = stream.into_split();
        wr.write_all(b"<getProperties version=\"1.7\"/>\n")
            .await
            .map_err(|e| Error::Indi(format!("Handshake with {} failed: {}", addr, e)))?;

        self.shared.lock_devices().clear();
        self.shared.connected.store(true, Ordering::SeqCst);
        self.writer = Some(wr);

        let shared = self.shared.clone();
        self.reader_task = Some(tokio::spawn(async move {
            read_stream(rd, &shared).await;
            shared.connected.store(false, Ordering::SeqCst);
        }));

        info!(address = %addr, "Connected to INDI server");
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        self.writer = None;
        if self.shared.connected.swap(false, Ordering::SeqCst) {
            info!(host = %self.host, port = self.port, "Disconnected from INDI server");
        }
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn devices(&self) -> Vec<Device> {
        self.shared
            .lock_devices()
            .iter()
            .map(|(name, entry)| Device {
                name: name.clone(),
                interface: entry.interface,
                properties: entry.properties.values().cloned().collect(),
            })
            .collect()
    }
}

/// Consume the server's XML stream until EOF or a read error, folding
/// every message into the shared tree.
async fn read_stream<R: AsyncRead + Unpin>(rd: R, shared: &Shared) {
    let mut reader = Reader::from_reader(BufReader::new(rd));
    reader.config_mut().trim_text(true);

    let mut parser = StreamParser::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into_async(&mut buf).await {
            Ok(Event::Eof) => {
                info!("INDI server closed the connection");
                break;
            }
            Ok(event) => parser.handle(event, shared),
            Err(e) => {
                warn!(error = %e, "INDI stream read failed");
                break;
            }
        }
        buf.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VectorOp {
    Define,
    Update,
}

#[derive(Debug)]
struct PendingVector {
    device: String,
    name: String,
    kind: PropertyKind,
    op: VectorOp,
    elements: Vec<Element>,
}

#[derive(Debug)]
struct PendingElement {
    name: String,
    kind: PropertyKind,
    text: String,
    blob_size: Option<usize>,
}

/// Incremental parser for the INDI message stream. Only property
/// vectors are interpreted; `message` and unknown elements are
/// ignored.
#[derive(Debug, Default)]
struct StreamParser {
    vector: Option<PendingVector>,
    element: Option<PendingElement>,
}

impl StreamParser {
    fn handle(&mut self, event: Event<'_>, shared: &Shared) {
        match event {
            Event::Start(e) => self.open(&e, shared, false),
            Event::Empty(e) => self.open(&e, shared, true),
            Event::Text(t) => {
                if let Some(element) = self.element.as_mut() {
                    // BLOB bodies are base64 bulk data; only the size
                    // attribute matters.
                    if element.kind != PropertyKind::Blob {
                        match t.unescape() {
                            Ok(text) => element.text.push_str(&text),
                            Err(e) => warn!(error = %e, "Malformed text content"),
                        }
                    }
                }
            }
            Event::End(e) => self.close(e.local_name().as_ref(), shared),
            _ => {}
        }
    }

    fn open(&mut self, e: &BytesStart<'_>, shared: &Shared, empty: bool) {
        let tag = e.local_name().as_ref().to_vec();

        if let Some((op, kind)) = vector_tag(&tag) {
            let device = attr(e, "device").unwrap_or_default();
            let name = attr(e, "name").unwrap_or_default();
            if device.is_empty() || name.is_empty() {
                warn!("Property vector without device or name, skipping");
                return;
            }
            self.vector = Some(PendingVector {
                device,
                name,
                kind,
                op,
                elements: Vec::new(),
            });
            if empty {
                self.commit_vector(shared);
            }
        } else if let Some(kind) = element_tag(&tag) {
            if self.vector.is_none() {
                return;
            }
            let Some(name) = attr(e, "name") else {
                warn!("Property element without name, skipping");
                return;
            };
            self.element = Some(PendingElement {
                name,
                kind,
                text: String::new(),
                blob_size: attr(e, "size").and_then(|s| s.trim().parse().ok()),
            });
            if empty {
                self.commit_element();
            }
        } else if tag == b"delProperty" {
            self.delete(e, shared);
        } else if tag == b"message" {
            if let Some(text) = attr(e, "message") {
                debug!(device = %attr(e, "device").unwrap_or_default(), %text, "INDI message");
            }
        }
    }

    fn close(&mut self, tag: &[u8], shared: &Shared) {
        if element_tag(tag).is_some() {
            self.commit_element();
        } else if vector_tag(tag).is_some() {
            self.commit_vector(shared);
        }
    }

    /// Coerce the pending element's text into a typed value. A value
    /// that fails to parse is dropped with a warning; the rest of the
    /// vector is unaffected.
    fn commit_element(&mut self) {
        let Some(pending) = self.element.take() else {
            return;
        };
        let Some(vector) = self.vector.as_mut() else {
            return;
        };

        let value = match pending.kind {
            PropertyKind::Text => Some(ElementValue::Text(pending.text.clone())),
            PropertyKind::Number => parse_indi_number(&pending.text).map(ElementValue::Number),
            PropertyKind::Switch => SwitchState::parse(&pending.text).map(ElementValue::Switch),
            PropertyKind::Light => LightState::parse(&pending.text).map(ElementValue::Light),
            PropertyKind::Blob => Some(ElementValue::Blob {
                size: pending.blob_size.unwrap_or(0),
            }),
        };

        match value {
            Some(value) => vector.elements.push(Element {
                name: pending.name,
                value,
            }),
            None => warn!(
                device = %vector.device,
                property = %vector.name,
                element = %pending.name,
                raw = %pending.text,
                "Unparseable element value, skipping"
            ),
        }
    }

    fn commit_vector(&mut self, shared: &Shared) {
        let Some(vector) = self.vector.take() else {
            return;
        };
        self.element = None;

        let mut devices = shared.lock_devices();
        let entry = devices.entry(vector.device.clone()).or_default();

        match vector.op {
            VectorOp::Define => {
                entry.properties.insert(
                    vector.name.clone(),
                    Property {
                        name: vector.name.clone(),
                        kind: vector.kind,
                        elements: vector.elements.clone(),
                    },
                );
            }
            VectorOp::Update => {
                // Tolerate an update arriving before the definition.
                let property =
                    entry
                        .properties
                        .entry(vector.name.clone())
                        .or_insert_with(|| Property {
                            name: vector.name.clone(),
                            kind: vector.kind,
                            elements: Vec::new(),
                        });
                for element in &vector.elements {
                    match property.elements.iter_mut().find(|e| e.name == element.name) {
                        Some(existing) => existing.value = element.value.clone(),
                        None => property.elements.push(element.clone()),
                    }
                }
            }
        }

        if vector.name == "DRIVER_INFO" {
            if let Some(mask) = vector.elements.iter().find_map(|e| match &e.value {
                ElementValue::Text(text) if e.name == "DRIVER_INTERFACE" => {
                    text.trim().parse::<u32>().ok()
                }
                _ => None,
            }) {
                entry.interface = mask;
            }
        }
    }

    fn delete(&mut self, e: &BytesStart<'_>, shared: &Shared) {
        let Some(device) = attr(e, "device") else {
            return;
        };
        let mut devices = shared.lock_devices();
        match attr(e, "name") {
            Some(name) => {
                if let Some(entry) = devices.get_mut(&device) {
                    entry.properties.remove(&name);
                }
            }
            None => {
                devices.remove(&device);
            }
        }
    }
}

fn vector_tag(tag: &[u8]) -> Option<(VectorOp, PropertyKind)> {
    match tag {
        b"defTextVector" => Some((VectorOp::Define, PropertyKind::Text)),
        b"defNumberVector" => Some((VectorOp::Define, PropertyKind::Number)),
        b"defSwitchVector" => Some((VectorOp::Define, PropertyKind::Switch)),
        b"defLightVector" => Some((VectorOp::Define, PropertyKind::Light)),
        b"defBLOBVector" => Some((VectorOp::Define, PropertyKind::Blob)),
        b"setTextVector" => Some((VectorOp::Update, PropertyKind::Text)),
        b"setNumberVector" => Some((VectorOp::Update, PropertyKind::Number)),
        b"setSwitchVector" => Some((VectorOp::Update, PropertyKind::Switch)),
        b"setLightVector" => Some((VectorOp::Update, PropertyKind::Light)),
        b"setBLOBVector" => Some((VectorOp::Update, PropertyKind::Blob)),
        _ => None,
    }
}

fn element_tag(tag: &[u8]) -> Option<PropertyKind> {
    match tag {
        b"defText" | b"oneText" => Some(PropertyKind::Text),
        b"defNumber" | b"oneNumber" => Some(PropertyKind::Number),
        b"defSwitch" | b"oneSwitch" => Some(PropertyKind::Switch),
        b"defLight" | b"oneLight" => Some(PropertyKind::Light),
        b"defBLOB" | b"oneBLOB" => Some(PropertyKind::Blob),
        _ => None,
    }
}

fn attr(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.attributes()
        .with_checks(false)
        .flatten()
        .find(|a| a.key.as_ref() == key.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Parse an INDI number: plain decimal, or sexagesimal with `:` or
/// whitespace separators ("12:30:45", "-10 30").
fn parse_indi_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(value) = text.parse::<f64>() {
        return Some(value);
    }

    let parts: Vec<&str> = text
        .split(|c: char| c == ':' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }

    let first: f64 = parts[0].parse().ok()?;
    let sign = if parts[0].starts_with('-') { -1.0 } else { 1.0 };
    let mut value = first.abs();
    for (part, divisor) in parts[1..].iter().zip([60.0, 3600.0]) {
        let fraction: f64 = part.parse().ok()?;
        if fraction < 0.0 {
            return None;
        }
        value += fraction / divisor;
    }
    Some(sign * value)
}
