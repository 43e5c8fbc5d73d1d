//! Latency measurements and their hand-off between threads.
//!
//! The queue monitor (receiver) or feedback monitor (sender) usually runs on a
//! different thread than the audio loop driving the tuner. [`SharedLatencyMetrics`]
//! is a last-write-wins slot between them; the tuner itself never locks.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Point-in-time latency measurement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LatencyMetrics {
    /// Estimated media buffered in the receiver's network incoming queue.
    pub niq_latency: Duration,
    /// Time since the last packet was added to the network incoming queue.
    pub niq_stalling: Duration,
    /// Estimated delay from capture on the sender to playback on the receiver.
    pub e2e_latency: Duration,
    /// Estimated packet interarrival jitter.
    pub jitter: Duration,
}

/// Latest-value slot for [`LatencyMetrics`].
///
/// `publish` overwrites any snapshot not yet taken; nothing is queued.
#[derive(Debug, Default)]
pub struct SharedLatencyMetrics {
    pending: Mutex<Option<LatencyMetrics>>,
}

impl SharedLatencyMetrics {
    /// Create a shared, mutex-protected slot.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replace the pending snapshot.
    pub fn publish(&self, metrics: LatencyMetrics) {
        *self.lock() = Some(metrics);
    }

    /// Take the pending snapshot, if one was published since the last take.
    pub fn take(&self) -> Option<LatencyMetrics> {
        self.lock().take()
    }

    // A panicking producer must not take the audio loop down with it.
    fn lock(&self) -> MutexGuard<'_, Option<LatencyMetrics>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
