//! Per-handle growable scratch buffer: `spec.md` §4.6.
//!
//! Not shared, carries no invariants across calls beyond its current
//! capacity, and is never serialized along with a [`crate::QueueHandle`]:
//! each handle recreates its own lazily on first use.

/// A growable byte buffer that doubles on overflow, capped at a fixed
/// ceiling (the owning queue's ring capacity).
#[derive(Debug)]
pub(crate) struct Scratch {
    buf: Vec<u8>,
    cap_ceiling: usize,
}

impl Scratch {
    pub(crate) fn new(initial_bytes: usize, cap_ceiling: usize) -> Self {
        let initial = initial_bytes.min(cap_ceiling).max(1);
        Self {
            buf: vec![0u8; initial],
            cap_ceiling,
        }
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    /// Doubles capacity, capped at `cap_ceiling`. Returns `false` if already
    /// at the ceiling (growth would be a no-op; the caller should treat this
    /// as "a single record cannot fit in this queue at all").
    pub(crate) fn grow(&mut self) -> bool {
        if self.buf.len() >= self.cap_ceiling {
            return false;
        }
        let new_len = (self.buf.len() * 2).min(self.cap_ceiling);
        self.buf.resize(new_len, 0);
        true
    }
}
