//! Error types surfaced by the queue.

use std::error::Error as StdError;
use thiserror::Error;

/// A boxed, type-erased error from a user-supplied codec.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Everything that can go wrong talking to a [`crate::Queue`].
///
/// None of these variants corrupt the ring: every error path leaves the
/// shared-region invariants intact (see `spec.md` §3). `Full`, `Empty`, and
/// `InconsistentRecovered` are retriable; `TooLarge` and `Closed` are not.
#[derive(Debug, Error)]
pub enum QueueError {
    /// No space for the requested batch within the timeout.
    #[error("queue is full")]
    Full,

    /// No records available within the timeout.
    #[error("queue is empty")]
    Empty,

    /// A single record, or an entire batch, exceeds the ring's capacity.
    /// Not retriable against this queue's configured capacity.
    #[error("record of {needed} bytes does not fit in a ring of {capacity} bytes")]
    TooLarge {
        /// Total framed size (length prefix + payload) that was requested.
        needed: usize,
        /// The ring's fixed capacity.
        capacity: usize,
    },

    /// The queue has been shut down. Terminal for the caller.
    #[error("queue is closed")]
    Closed,

    /// The mutex was found in an inconsistent state (a previous holder died
    /// mid-critical-section). It has been marked consistent; the operation
    /// that observed this did not execute and may be retried.
    #[error("previous holder died mid-operation; queue recovered, retry")]
    InconsistentRecovered,

    /// The user-supplied serializer failed. Ring state is unaffected because
    /// serialization always happens before the mutex is acquired.
    #[error("serialization failed: {0}")]
    Serialize(#[source] BoxError),

    /// The user-supplied deserializer failed. Ring state is unaffected
    /// because deserialization always happens after the mutex is released.
    #[error("deserialization failed: {0}")]
    Deserialize(#[source] BoxError),

    /// An OS-level failure creating, attaching, or tearing down the shared
    /// region (`shm_open`/`mmap`/`pthread_*`).
    #[error("shared-memory system call failed: {0}")]
    System(#[from] std::io::Error),
}

impl QueueError {
    /// Returns `true` if the same call might succeed if retried as-is.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Full | Self::Empty | Self::InconsistentRecovered)
    }
}

/// Convenience alias for fallible queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
