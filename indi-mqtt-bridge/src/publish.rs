//! Topic publishing for one poll cycle.
//!
//! Ordering guarantee: `<root>/status` always reflects the INDI link
//! state before any other topic of the cycle is published. When the
//! aggregate document is enabled it goes out right after the status
//! and before the leaf topics, so consumers can treat it as a
//! full-refresh marker.

use tracing::{debug, warn};

use indi_mqtt_common::flatten::CanonicalDocument;
use indi_mqtt_common::topic::TopicBuilder;

use crate::config::PublishConfig;
use crate::mqtt::MessageBus;

/// Publishes a canonical document as MQTT topics.
pub struct TopicPublisher<B> {
    bus: B,
    topics: TopicBuilder,
    publish_json: bool,
    list_topics: bool,
}

impl<B: MessageBus> TopicPublisher<B> {
    pub fn new(bus: B, topics: TopicBuilder, config: &PublishConfig) -> Self {
        Self {
            bus,
            topics,
            publish_json: config.json,
            list_topics: config.list_topics,
        }
    }

    /// Status-only cycle while the INDI link is down.
    pub async fn publish_offline(&self) {
        self.publish_status(false).await;
    }

    /// Publish one full snapshot: status first, then the optional
    /// aggregate document, then every leaf. Individual publish
    /// failures are logged and skipped; the cycle always attempts all
    /// remaining topics. Returns the number of successful leaf
    /// publishes.
    pub async fn publish_snapshot(&self, doc: &CanonicalDocument) -> usize {
        self.publish_status(true).await;

        if self.publish_json {
            match doc.to_json() {
                Ok(json) => self.try_publish(&self.topics.json(), json).await,
                Err(e) => warn!(error = %e, "Failed to serialize aggregate document"),
            }
        }

        let mut published = 0;
        for leaf in doc.leaves() {
            let topic = self
                .topics
                .leaf(leaf.category, leaf.device, leaf.property, leaf.element);
            if self.list_topics {
                println!("{}", topic);
            }
            match self.bus.publish(&topic, leaf.value.to_string()).await {
                Ok(()) => published += 1,
                Err(e) => warn!(topic = %topic, error = %e, "Publish failed"),
            }
        }

        debug!(leaves = published, total = doc.leaf_count(), "Publish cycle finished");
        published
    }

    async fn publish_status(&self, online: bool) {
        let payload = if online { "ON" } else { "OFF" };
        self.try_publish(&self.topics.status(), payload.to_string())
            .await;
    }

    async fn try_publish(&self, topic: &str, payload: String) {
        if let Err(e) = self.bus.publish(topic, payload).await {
            warn!(topic = %topic, error = %e, "Publish failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use indi_mqtt_common::device::{
        Device, Element, ElementValue, Property, PropertyKind, SwitchState,
    };
    use indi_mqtt_common::error::{Error, Result};
    use indi_mqtt_common::flatten::flatten;

    /// Records every publish; optionally fails for chosen topics.
    #[derive(Clone, Default)]
    struct RecordingBus {
        published: Arc<Mutex<Vec<(String, String)>>>,
        fail_topics: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingBus {
        fn published(&self) -> Vec<(String, String)> {
            self.published.lock().unwrap().clone()
        }

        fn fail_on(&self, topic: &str) {
            self.fail_topics.lock().unwrap().push(topic.to_string());
        }
    }

    impl MessageBus for RecordingBus {
        async fn publish(&self, topic: &str, payload: String) -> Result<()> {
            if self.fail_topics.lock().unwrap().iter().any(|t| t == topic) {
                return Err(Error::Mqtt(format!("forced failure for {}", topic)));
            }
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

    fn telescope() -> Device {
        Device {
            name: "Telescope Simulator".to_string(),
            interface: 1,
            properties: vec![Property {
                name: "CONNECTION".to_string(),
                kind: PropertyKind::Switch,
                elements: vec![
                    Element {
                        name: "CONNECT".to_string(),
                        value: ElementValue::Switch(SwitchState::On),
                    },
                    Element {
                        name: "DISCONNECT".to_string(),
                        value: ElementValue::Switch(SwitchState::Off),
                    },
                ],
            }],
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

    #[tokio::test]
    async fn test_offline_cycle_publishes_only_status() {
        let bus = RecordingBus::default();
        publisher(bus.clone(), true).publish_offline().await;

        assert_eq!(
            bus.published(),
            vec![("observatory/status".to_string(), "OFF".to_string())]
        );
    }

    #[tokio::test]
    async fn test_snapshot_status_first_then_leaves() {
        let bus = RecordingBus::default();
        let doc = flatten(&[telescope()]);
        let count = publisher(bus.clone(), false).publish_snapshot(&doc).await;

        let published = bus.published();
        assert_eq!(count, 2);
        assert_eq!(published[0], ("observatory/status".to_string(), "ON".to_string()));
        assert_eq!(
            published[1],
            (
                "observatory/telescope/telescope_simulator/connection/connect".to_string(),
                "ON".to_string()
            )
        );
        assert_eq!(
            published[2],
            (
                "observatory/telescope/telescope_simulator/connection/disconnect".to_string(),
                "OFF".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_aggregate_goes_out_before_leaves() {
        let bus = RecordingBus::default();
        let doc = flatten(&[telescope()]);
        publisher(bus.clone(), true).publish_snapshot(&doc).await;

        let topics: Vec<String> = bus.published().into_iter().map(|(t, _)| t).collect();
        assert_eq!(topics[0], "observatory/status");
        assert_eq!(topics[1], "observatory/json");
        assert!(topics[2..].iter().all(|t| t.starts_with("observatory/telescope/")));
    }

    #[tokio::test]
    async fn test_leaf_failure_does_not_abort_cycle() {
        let bus = RecordingBus::default();
        bus.fail_on("observatory/telescope/telescope_simulator/connection/connect");
        let doc = flatten(&[telescope()]);
        let count = publisher(bus.clone(), false).publish_snapshot(&doc).await;

        // The failed leaf is skipped, the remaining one still goes out.
        assert_eq!(count, 1);
        let topics: Vec<String> = bus.published().into_iter().map(|(t, _)| t).collect();
        assert!(topics.contains(&"observatory/telescope/telescope_simulator/connection/disconnect".to_string()));
    }

    #[tokio::test]
    async fn test_aggregate_payload_is_valid_json() {
        let bus = RecordingBus::default();
        let doc = flatten(&[telescope()]);
        publisher(bus.clone(), true).publish_snapshot(&doc).await;

        let (_, payload) = bus
            .published()
            .into_iter()
            .find(|(t, _)| t == "observatory/json")
            .expect("aggregate publish");
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(
            value["TELESCOPE"]["TELESCOPE_SIMULATOR"]["CONNECTION"]["CONNECT"],
            "ON"
        );
    }
}
