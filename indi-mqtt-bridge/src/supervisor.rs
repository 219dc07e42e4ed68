//! Per-link connection state tracking and retry pacing.
//!
//! Each external link (INDI server, MQTT broker) owns one
//! [`LinkState`]. Failed attempts are paced by a fixed backoff sleep
//! that stays cancellable by the shutdown signal; neither link ever
//! gives up permanently.

use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

/// Connection state of one external link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        }
    }
}

/// Connection state holder for one link, observable through a watch
/// channel.
#[derive(Debug, Clone)]
pub struct LinkState {
    link: &'static str,
    tx: watch::Sender<ConnectionStatus>,
    backoff: Duration,
}

impl LinkState {
    /// Create a new link state, starting disconnected.
    pub fn new(link: &'static str, backoff: Duration) -> Self {
        let (tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self { link, tx, backoff }
    }

    /// Current status.
    pub fn get(&self) -> ConnectionStatus {
        *self.tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.get() == ConnectionStatus::Connected
    }

    /// Subscribe to status changes.
    pub fn watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.tx.subscribe()
    }

    /// Record a status transition. Logs only on actual change.
    pub fn set(&self, status: ConnectionStatus) {
        let changed = self.tx.send_if_modified(|current| {
            if *current != status {
                *current = status;
                true
            } else {
                false
            }
        });
        if changed {
            info!(link = self.link, status = status.as_str(), "Link status changed");
        }
    }

    /// Sleep the configured backoff between attempts. Returns `false`
    /// if shutdown was requested during the wait.
    pub async fn backoff_wait(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.backoff) => true,
            _ = wait_for_shutdown(shutdown) => false,
        }
    }
}

/// Resolve once the shutdown flag flips to `true` (or the sender is
/// dropped, which also means the process is going away).
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
