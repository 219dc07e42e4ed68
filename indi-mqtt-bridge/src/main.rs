//! MQTT bridge for the INDI device-control protocol.
//!
//! Mirrors the full state of every device on a remote INDI server to
//! an MQTT topic hierarchy, with a runtime-adjustable polling
//! interval.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use indi_mqtt_bridge::bridge::BridgeLoop;
use indi_mqtt_bridge::config::BridgeConfig;
use indi_mqtt_bridge::indi::IndiClient;
use indi_mqtt_bridge::mqtt::MqttBus;
use indi_mqtt_bridge::poll::PollController;
use indi_mqtt_bridge::publish::TopicPublisher;
use indi_mqtt_bridge::supervisor::LinkState;
use indi_mqtt_common::topic::TopicBuilder;

/// Backoff between reconnect attempts, per link.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(10);

/// MQTT bridge for the INDI device-control protocol.
#[derive(Parser, Debug)]
#[command(name = "indi-mqtt-bridge")]
#[command(about = "Republishes an INDI device tree as MQTT topics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "/etc/indi-mqtt.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Override INDI server hostname or IP
    #[arg(long)]
    indi_host: Option<String>,

    /// Override INDI server port
    #[arg(long)]
    indi_port: Option<u16>,

    /// Override MQTT broker hostname or IP
    #[arg(long)]
    mqtt_host: Option<String>,

    /// Override MQTT broker port
    #[arg(long)]
    mqtt_port: Option<u16>,

    /// Override MQTT username
    #[arg(long)]
    mqtt_user: Option<String>,

    /// Override MQTT password
    #[arg(long)]
    mqtt_pass: Option<String>,

    /// Override root topic
    #[arg(long)]
    mqtt_root: Option<String>,

    /// Override polling interval in seconds (0 = manual mode)
    #[arg(long)]
    mqtt_polling: Option<u64>,

    /// Also publish the whole snapshot as JSON to <root>/json
    #[arg(short = 'j', long)]
    mqtt_json: bool,

    /// Print every published leaf topic to stdout
    #[arg(short, long)]
    list_topics: bool,
}

impl Args {
    /// Apply CLI overrides on top of the file configuration.
    fn apply_to(&self, config: &mut BridgeConfig) {
        if let Some(host) = &self.indi_host {
            config.indi.host = host.clone();
        }
        if let Some(port) = self.indi_port {
            config.indi.port = port;
        }
        if let Some(host) = &self.mqtt_host {
            config.mqtt.host = host.clone();
        }
        if let Some(port) = self.mqtt_port {
            config.mqtt.port = port;
        }
        if let Some(user) = &self.mqtt_user {
            config.mqtt.username = Some(user.clone());
        }
        if let Some(pass) = &self.mqtt_pass {
            config.mqtt.password = Some(pass.clone());
        }
        if let Some(root) = &self.mqtt_root {
            config.publish.root = root.clone();
        }
        if let Some(polling) = self.mqtt_polling {
            config.publish.polling_secs = polling;
        }
        if self.mqtt_json {
            config.publish.json = true;
        }
        if self.list_topics {
            config.publish.list_topics = true;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The config file is optional; defaults cover a local setup.
    let mut config = if args.config.is_file() {
        BridgeConfig::load_from_file(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?
    } else {
        BridgeConfig::default()
    };
    args.apply_to(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    indi_mqtt_common::init_tracing(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!("Starting indi-mqtt-bridge");
    if args.config.is_file() {
        info!("Loaded configuration from {:?}", args.config);
    }

    let topics = TopicBuilder::new(&config.publish.root);
    if config.publish.polling_secs > 0 {
        info!(
            interval_secs = config.publish.polling_secs,
            "Starting in auto refresh mode"
        );
    } else {
        info!(
            topic = %topics.poll(),
            "Starting in manual refresh mode; publish a refresh time in seconds to the control topic"
        );
    }

    // Shutdown fan-out: Ctrl+C flips the flag for every task.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
        }
        let _ = shutdown_tx.send(true);
    });

    // The two links connect independently: the MQTT event loop starts
    // first and retries on its own while the bridge loop supervises
    // the INDI link.
    let poll = PollController::new(config.publish.polling_secs);
    let mqtt_link = LinkState::new("mqtt", RECONNECT_BACKOFF);
    let (bus, mut mqtt_task) = MqttBus::connect(
        &config.mqtt,
        topics.poll(),
        poll.clone(),
        mqtt_link,
        shutdown_rx.clone(),
    );

    let indi_link = LinkState::new("indi", RECONNECT_BACKOFF);
    let client = IndiClient::new(config.indi.host.clone(), config.indi.port);
    let publisher = TopicPublisher::new(bus.clone(), topics, &config.publish);

    BridgeLoop::new(client, publisher, poll, indi_link, shutdown_rx)
        .run()
        .await;

    // Clean MQTT teardown; don't wait forever if the broker is gone.
    bus.disconnect().await;
    if tokio::time::timeout(Duration::from_secs(2), &mut mqtt_task)
        .await
        .is_err()
    {
        warn!("MQTT event loop did not stop in time, aborting");
        mqtt_task.abort();
    }

    info!("Good bye");
    Ok(())
}
