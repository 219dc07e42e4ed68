//! Integration tests for indi-mqtt-bridge.

use std::sync::{Arc, Mutex};

use indi_mqtt_bridge::config::PublishConfig;
use indi_mqtt_bridge::mqtt::MessageBus;
use indi_mqtt_bridge::poll::PollController;
use indi_mqtt_bridge::publish::TopicPublisher;
use indi_mqtt_common::device::{
    Device, DeviceCategory, Element, ElementValue, Property, PropertyKind, SwitchState,
};
use indi_mqtt_common::error::Result;
use indi_mqtt_common::flatten::flatten;
use indi_mqtt_common::topic::TopicBuilder;

/// Test double for the broker link, recording every publish in order.
#[derive(Clone, Default)]
struct RecordingBus {
    published: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingBus {
    fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }
}

impl MessageBus for RecordingBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<()> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}

fn switch_property(name: &str, elements: &[(&str, SwitchState)]) -> Property {
    Property {
        name: name.to_string(),
        kind: PropertyKind::Switch,
        elements: elements
            .iter()
            .map(|(element, state)| Element {
                name: element.to_string(),
                value: ElementValue::Switch(*state),
            })
            .collect(),
    }
}

fn publisher(bus: RecordingBus, json: bool) -> TopicPublisher<RecordingBus> {
    let config = PublishConfig {
        root: "observatory".to_string(),
        polling_secs: 10,
        json,
        list_topics: false,
    };
    TopicPublisher::new(bus, TopicBuilder::new("observatory"), &config)
}

/// The spec's reference scenario: "Telescope Simulator" with interface
/// bit 0 and CONNECTION/CONNECT = on ends up on the expected topic
/// with payload "ON".
#[tokio::test]
async fn telescope_simulator_switch_topic() {
    let device = Device {
        name: "Telescope Simulator".to_string(),
        interface: 1,
        properties: vec![switch_property(
            "CONNECTION",
            &[("CONNECT", SwitchState::On), ("DISCONNECT", SwitchState::Off)],
        )],
    };

    let bus = RecordingBus::default();
    publisher(bus.clone(), false)
        .publish_snapshot(&flatten(&[device]))
        .await;

    let published = bus.published();
    assert_eq!(published[0], ("observatory/status".to_string(), "ON".to_string()));
    assert!(published.contains(&(
        "observatory/telescope/telescope_simulator/connection/connect".to_string(),
        "ON".to_string()
    )));
}

/// Binary payloads never reach the bus; a 2048-byte blob publishes
/// exactly its size placeholder.
#[tokio::test]
async fn blob_publishes_size_placeholder() {
    let device = Device {
        name: "CCD Simulator".to_string(),
        interface: 1 << 1,
        properties: vec![Property {
            name: "CCD1".to_string(),
            kind: PropertyKind::Blob,
            elements: vec![Element {
                name: "CCD1".to_string(),
                value: ElementValue::Blob { size: 2048 },
            }],
        }],
    };

    let bus = RecordingBus::default();
    publisher(bus.clone(), false)
        .publish_snapshot(&flatten(&[device]))
        .await;

    let (_, payload) = bus
        .published()
        .into_iter()
        .find(|(topic, _)| topic == "observatory/ccd/ccd_simulator/ccd1/ccd1")
        .expect("blob leaf");
    assert_eq!(payload, "<blob 2048 bytes>");
}

/// Two devices of the same category share one category key in the
/// aggregate document, distinguished by device name.
#[tokio::test]
async fn same_category_devices_share_aggregate_key() {
    let make_ccd = |name: &str| Device {
        name: name.to_string(),
        interface: 1 << 1,
        properties: vec![switch_property("CONNECTION", &[("CONNECT", SwitchState::On)])],
    };

    let bus = RecordingBus::default();
    publisher(bus.clone(), true)
        .publish_snapshot(&flatten(&[
            make_ccd("CCD Simulator"),
            make_ccd("CCD Simulator 2"),
        ]))
        .await;

    let (_, payload) = bus
        .published()
        .into_iter()
        .find(|(topic, _)| topic == "observatory/json")
        .expect("aggregate publish");
    let doc: serde_json::Value = serde_json::from_str(&payload).unwrap();

    let ccds = doc["CCD"].as_object().expect("CCD category object");
    assert_eq!(ccds.len(), 2);
    assert_eq!(doc["CCD"]["CCD_SIMULATOR"]["CONNECTION"]["CONNECT"], "ON");
    assert_eq!(doc["CCD"]["CCD_SIMULATOR_2"]["CONNECTION"]["CONNECT"], "ON");
}

/// A cycle against a downed INDI link publishes only status OFF.
#[tokio::test]
async fn offline_cycle_is_status_only() {
    let bus = RecordingBus::default();
    publisher(bus.clone(), true).publish_offline().await;

    assert_eq!(
        bus.published(),
        vec![("observatory/status".to_string(), "OFF".to_string())]
    );
}

/// Topic strings are a pure function of the document coordinates.
#[test]
fn topic_paths_are_deterministic() {
    let device = Device {
        name: "Rotator Sim".to_string(),
        interface: 1 << 12,
        properties: vec![switch_property("CONNECTION", &[("CONNECT", SwitchState::Off)])],
    };

    let topics = TopicBuilder::new("observatory");
    let doc = flatten(&[device]);

    let first: Vec<String> = doc
        .leaves()
        .map(|l| topics.leaf(l.category, l.device, l.property, l.element))
        .collect();
    let second: Vec<String> = doc
        .leaves()
        .map(|l| topics.leaf(l.category, l.device, l.property, l.element))
        .collect();

    assert_eq!(first, second);
    assert_eq!(first, vec!["observatory/rotator/rotator_sim/connection/connect"]);
}

/// The polling control accept/reject contract end to end.
#[test]
fn polling_control_contract() {
    let poll = PollController::new(10);

    poll.handle_control("15");
    assert_eq!(poll.interval_secs(), 15);

    poll.handle_control("0");
    assert_eq!(poll.interval_secs(), 0);

    poll.handle_control("45");
    assert_eq!(poll.interval_secs(), 45);

    for rejected in ["-3", "abc", ""] {
        poll.handle_control(rejected);
        assert_eq!(poll.interval_secs(), 45, "payload {:?}", rejected);
    }
}

/// Category resolution feeds the topic hierarchy.
#[test]
fn category_drives_topic_segment() {
    let cases = [
        (0, "GENERAL"),
        (1 << 0, "TELESCOPE"),
        (1 << 5, "DOME"),
        (1 << 15, "AUX"),
        (1 << 14, "UNKNOWN"),
    ];
    for (mask, expected) in cases {
        assert_eq!(DeviceCategory::from_interface(mask).as_str(), expected);
    }
}
