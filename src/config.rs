/// Smallest scratch buffer a handle will allocate on first use.
const MIN_SCRATCH_BYTES: usize = 5000;

/// Configuration for a [`crate::Queue`].
///
/// Mirrors the shared region's fixed sizing decisions: the ring's byte
/// capacity and the starting size of each handle's thread-local scratch
/// buffer (which grows by doubling, capped at `capacity_bytes`; see
/// `spec.md` §4.6).
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Byte capacity of the ring. Fixed for the lifetime of the shared region.
    pub capacity_bytes: usize,
    /// Initial size of a handle's scratch buffer, before any growth.
    pub initial_scratch_bytes: usize,
    /// Enable [`crate::Metrics`] collection (slight overhead: one extra
    /// atomic increment per critical section, never per message within a
    /// batch; `spec.md` §4.8). Disabled by default.
    pub enable_metrics: bool,
}

impl QueueConfig {
    /// Creates a new configuration.
    ///
    /// # Panics
    ///
    /// Panics if `capacity_bytes` is too small to hold even an empty record
    /// (a 4-byte length prefix), or if `initial_scratch_bytes` is zero.
    pub const fn new(capacity_bytes: usize, initial_scratch_bytes: usize, enable_metrics: bool) -> Self {
        assert!(capacity_bytes >= 4, "capacity_bytes must fit at least a length prefix");
        assert!(initial_scratch_bytes > 0, "initial_scratch_bytes must be positive");

        Self {
            capacity_bytes,
            initial_scratch_bytes,
            enable_metrics,
        }
    }

    /// Convenience constructor taking just the ring capacity; scratch starts
    /// at the default size (or the full capacity if smaller), metrics
    /// disabled.
    pub const fn with_capacity(capacity_bytes: usize) -> Self {
        let initial = if capacity_bytes < MIN_SCRATCH_BYTES {
            capacity_bytes
        } else {
            MIN_SCRATCH_BYTES
        };
        Self::new(capacity_bytes, initial, false)
    }

    /// Returns this configuration with metrics collection toggled.
    pub const fn with_metrics_enabled(mut self, enable_metrics: bool) -> Self {
        self.enable_metrics = enable_metrics;
        self
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::with_capacity(1_000_000)
    }
}

/// Preset tuned for many small messages and many waiters (smaller scratch,
/// larger ring so bulk batches have room to amortize wake-ups).
pub const HIGH_FANOUT_CONFIG: QueueConfig = QueueConfig::new(4 * 1024 * 1024, 16 * 1024, false);

/// Preset tuned for a handful of large messages (scratch starts close to the
/// expected message size so the common case needs no growth retry).
pub const LARGE_MESSAGE_CONFIG: QueueConfig = QueueConfig::new(16 * 1024 * 1024, 1024 * 1024, false);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_sane() {
        let c = QueueConfig::default();
        assert_eq!(c.capacity_bytes, 1_000_000);
        assert!(c.initial_scratch_bytes <= c.capacity_bytes);
        assert!(!c.enable_metrics);
    }

    #[test]
    fn with_capacity_clamps_scratch_to_small_rings() {
        let c = QueueConfig::with_capacity(64);
        assert_eq!(c.initial_scratch_bytes, 64);
    }

    #[test]
    fn with_metrics_enabled_toggles_the_flag() {
        let c = QueueConfig::with_capacity(64).with_metrics_enabled(true);
        assert!(c.enable_metrics);
    }

    #[test]
    #[should_panic(expected = "capacity_bytes must fit")]
    fn rejects_tiny_capacity() {
        let _ = QueueConfig::new(1, 1, false);
    }
}
