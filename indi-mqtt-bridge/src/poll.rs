//! Runtime polling control.
//!
//! The polling interval can be changed at runtime by publishing a
//! non-negative integer (seconds) to `<root>/poll`. The handler runs
//! on the MQTT event-loop task while the bridge loop reads the value,
//! so the interval lives in an atomic.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Shared polling state plus the wake signal for on-demand cycles.
#[derive(Debug, Clone)]
pub struct PollController {
    interval_secs: Arc<AtomicU64>,
    wake: Arc<Notify>,
}

impl PollController {
    /// Create a controller with the configured initial interval
    /// (0 = manual mode).
    pub fn new(initial_secs: u64) -> Self {
        Self {
            interval_secs: Arc::new(AtomicU64::new(initial_secs)),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Current interval in seconds; 0 means manual mode.
    pub fn interval_secs(&self) -> u64 {
        self.interval_secs.load(Ordering::Relaxed)
    }

    /// Wait until a control message requests an immediate cycle.
    pub async fn wake_requested(&self) {
        self.wake.notified().await;
    }

    /// Handle an inbound control payload.
    ///
    /// The payload must be a non-negative decimal integer; anything
    /// else is dropped with a warning and leaves the interval
    /// untouched. Valid messages also wake the bridge loop for an
    /// immediate cycle.
    pub fn handle_control(&self, payload: &str) {
        debug!(payload, "Polling control message received");

        let Ok(secs) = payload.trim().parse::<u64>() else {
            warn!(payload, "Invalid polling control message");
            return;
        };

        let previous = self.interval_secs.swap(secs, Ordering::Relaxed);
        if secs > 0 {
            info!(interval_secs = secs, "Setting auto refresh mode");
        } else if previous != 0 {
            info!("Setting manual refresh mode");
        }

        self.wake.notify_one();
    }
}
