//! The top-level bridge loop.
//!
//! One iteration: make sure the INDI link is up (publishing a
//! status-only OFF cycle while it is not), snapshot and flatten the
//! device tree, publish the cycle, then sleep until the next tick or
//! an early wake (control message, shutdown). Reconnecting to the
//! INDI server blocks further polling but stays responsive to
//! shutdown; the MQTT link is serviced concurrently by its own task.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use indi_mqtt_common::flatten::flatten;

use crate::indi::DeviceSource;
use crate::mqtt::MessageBus;
use crate::poll::PollController;
use crate::publish::TopicPublisher;
use crate::supervisor::{ConnectionStatus, LinkState, wait_for_shutdown};

/// Delay after a fresh INDI connection before the first tree read, so
/// the server has a chance to stream the property definitions.
const SETTLE_DELAY: Duration = Duration::from_secs(1);

pub struct BridgeLoop<S, B> {
    source: S,
    publisher: TopicPublisher<B>,
    poll: PollController,
    indi_link: LinkState,
    shutdown: watch::Receiver<bool>,
    settle_delay: Duration,
}

impl<S: DeviceSource, B: MessageBus> BridgeLoop<S, B> {
    pub fn new(
        source: S,
        publisher: TopicPublisher<B>,
        poll: PollController,
        indi_link: LinkState,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            publisher,
            poll,
            indi_link,
            shutdown,
            settle_delay: SETTLE_DELAY,
        }
    }

    #[cfg(test)]
    fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Run until shutdown. Disconnects the INDI link before
    /// returning; an in-flight publish batch is always completed.
    pub async fn run(mut self) {
        loop {
            if *self.shutdown.borrow() {
                break;
            }

            if !self.source.is_connected() {
                self.indi_link.set(ConnectionStatus::Disconnected);
                if !self.reconnect().await {
                    break;
                }
                continue;
            }

            let devices = self.source.devices();
            let doc = flatten(&devices);
            debug!(devices = devices.len(), leaves = doc.leaf_count(), "Poll cycle");
            self.publisher.publish_snapshot(&doc).await;

            if !self.next_tick().await {
                break;
            }
        }

        self.source.disconnect().await;
        self.indi_link.set(ConnectionStatus::Disconnected);
        info!("Bridge loop stopped");
    }

    /// Reconnect loop for the INDI link: retry forever with backoff,
    /// publishing status-only OFF cycles while the link is down.
    /// Returns `false` if shutdown was requested during the wait.
    async fn reconnect(&mut self) -> bool {
        let mut first_attempt = true;

        loop {
            if *self.shutdown.borrow() {
                return false;
            }

            // The first round always reports OFF so an on-demand cycle
            // against a dead link still answers; later rounds only
            // keep repeating it in auto-polling mode.
            if first_attempt || self.poll.interval_secs() > 0 {
                self.publisher.publish_offline().await;
            }
            first_attempt = false;

            self.indi_link.set(ConnectionStatus::Connecting);
            match self.source.connect().await {
                Ok(()) => {
                    self.indi_link.set(ConnectionStatus::Connected);
                    // Give the server a moment to stream the tree.
                    tokio::select! {
                        _ = tokio::time::sleep(self.settle_delay) => {}
                        _ = wait_for_shutdown(&mut self.shutdown) => return false,
                    }
                    return true;
                }
                Err(e) => {
                    debug!(error = %e, "INDI server not available, retrying");
                    self.indi_link.set(ConnectionStatus::Disconnected);
                    if !self.indi_link.backoff_wait(&mut self.shutdown).await {
                        return false;
                    }
                }
            }
        }
    }

    /// Wait for the next cycle: the polling interval in auto mode, or
    /// a control-message wake in manual mode. Either way a control
    /// message wakes the loop early. Returns `false` on shutdown.
    async fn next_tick(&mut self) -> bool {
        let interval = self.poll.interval_secs();
        if interval > 0 {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(interval)) => true,
                _ = self.poll.wake_requested() => true,
                _ = wait_for_shutdown(&mut self.shutdown) => false,
            }
        } else {
            tokio::select! {
                _ = self.poll.wake_requested() => true,
                _ = wait_for_shutdown(&mut self.shutdown) => false,
            }
        }
    }
}
