//! MQTT transport.
//!
//! Wraps a rumqttc [`AsyncClient`] plus the event-loop task that keeps
//! the broker connection alive, resubscribes the polling-control topic
//! after every (re)connect and forwards control payloads to the
//! [`PollController`]. The event loop services the connection
//! independently of the bridge loop, so control messages arrive even
//! while a poll cycle sleeps or blocks on the INDI link.

use std::time::Duration;

use rand::Rng;
use rand::distributions::Alphanumeric;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use indi_mqtt_common::config::MqttConfig;
use indi_mqtt_common::error::{Error, Result};

use crate::poll::PollController;
use crate::supervisor::{ConnectionStatus, LinkState};

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const CHANNEL_CAPACITY: usize = 64;

/// Abstraction over the message-bus link consumed by the publisher.
/// Implemented by [`MqttBus`] and by test doubles.
pub trait MessageBus {
    fn publish(&self, topic: &str, payload: String) -> impl Future<Output = Result<()>>;
    fn is_connected(&self) -> bool;
}

/// Handle to the MQTT broker connection.
#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
    link: LinkState,
}

impl MqttBus {
    /// Set up the broker connection and spawn its event-loop task.
    ///
    /// rumqttc connects lazily and retries on its own; each failed
    /// poll is paced by the link's backoff so a missing broker never
    /// spins.
    pub fn connect(
        config: &MqttConfig,
        poll_topic: String,
        controller: PollController,
        link: LinkState,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, JoinHandle<()>) {
        let id = client_id();
        debug!(client_id = %id, "Creating MQTT client");

        let mut options = MqttOptions::new(id, &config.host, config.port);
        options.set_keep_alive(KEEP_ALIVE);
        if let Some((user, pass)) = config.credentials() {
            options.set_credentials(user, pass);
        }

        let (client, eventloop) = AsyncClient::new(options, CHANNEL_CAPACITY);
        link.set(ConnectionStatus::Connecting);

        let bus = Self {
            client: client.clone(),
            link: link.clone(),
        };

        let host = config.host.clone();
        let port = config.port;
        let task = tokio::spawn(event_loop_task(
            eventloop, client, link, host, port, poll_topic, controller, shutdown,
        ));

        (bus, task)
    }

    /// Send a clean MQTT disconnect.
    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "MQTT disconnect request failed");
        }
        self.link.set(ConnectionStatus::Disconnected);
    }
}

impl MessageBus for MqttBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<()> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| Error::Mqtt(format!("Publish to '{}' failed: {}", topic, e)))
    }

    fn is_connected(&self) -> bool {
        self.link.is_connected()
    }
}

#[allow(clippy::too_many_arguments)]
async fn event_loop_task(
    mut eventloop: rumqttc::EventLoop,
    client: AsyncClient,
    link: LinkState,
    host: String,
    port: u16,
    poll_topic: String,
    controller: PollController,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                link.set(ConnectionStatus::Connected);
                info!(host = %host, port, "Connected to MQTT broker");

                // (Re)subscribe the polling-control topic on every
                // fresh session.
                match client.subscribe(poll_topic.clone(), QoS::AtLeastOnce).await {
                    Ok(()) => info!(topic = %poll_topic, "Subscribed to polling control topic"),
                    Err(e) => warn!(topic = %poll_topic, error = %e, "Subscribe failed"),
                }
            }
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                if publish.topic == poll_topic {
                    let payload = String::from_utf8_lossy(&publish.payload);
                    controller.handle_control(&payload);
                } else {
                    debug!(topic = %publish.topic, "Ignoring message on unexpected topic");
                }
            }
            Ok(Event::Incoming(Incoming::Disconnect)) => {
                link.set(ConnectionStatus::Disconnected);
                warn!(host = %host, port, "MQTT broker requested disconnect");
            }
            Ok(_) => {}
            Err(e) => {
                link.set(ConnectionStatus::Disconnected);
                if *shutdown.borrow() {
                    break;
                }
                warn!(host = %host, port, error = %e, "MQTT connection lost, retrying");
                link.set(ConnectionStatus::Connecting);
                if !link.backoff_wait(&mut shutdown).await {
                    break;
                }
            }
        }
    }

    debug!("MQTT event loop stopped");
}

/// Random client id, `indi-mqtt-<8 alphanumerics>`.
fn client_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("indi-mqtt-{}", suffix)
}
