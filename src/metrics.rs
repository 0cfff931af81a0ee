//! Optional metrics for monitoring queue activity.

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe, cross-process-unaware counters for a single [`crate::Queue`]
/// handle. Each handle keeps its own counters; aggregate across handles at
/// the call site if needed.
///
/// Updated once per critical section, never once per message within a batch,
/// so enabling metrics does not reintroduce the per-message overhead the
/// bulk-transfer design exists to avoid.
#[derive(Debug, Default)]
pub struct Metrics {
    messages_put: AtomicU64,
    messages_got: AtomicU64,
    batches_put: AtomicU64,
    batches_got: AtomicU64,
    scratch_growths: AtomicU64,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_put(&self, messages: u64) {
        self.messages_put.fetch_add(messages, Ordering::Relaxed);
        self.batches_put.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_get(&self, messages: u64) {
        self.messages_got.fetch_add(messages, Ordering::Relaxed);
        self.batches_got.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_scratch_growth(&self) {
        self.scratch_growths.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a consistent-enough snapshot of the current counters.
    ///
    /// The snapshot is not atomic across fields (each field is read with its
    /// own relaxed load), which is adequate for monitoring purposes.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_put: self.messages_put.load(Ordering::Relaxed),
            messages_got: self.messages_got.load(Ordering::Relaxed),
            batches_put: self.batches_put.load(Ordering::Relaxed),
            batches_got: self.batches_got.load(Ordering::Relaxed),
            scratch_growths: self.scratch_growths.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of a [`Metrics`] block's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_put: u64,
    pub messages_got: u64,
    pub batches_put: u64,
    pub batches_got: u64,
    pub scratch_growths: u64,
}
