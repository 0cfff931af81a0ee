//! `ringshm`: a bounded multi-producer/multi-consumer FIFO queue backed by
//! a single shared-memory ring buffer, for cooperating OS processes (and
//! threads within them).
//!
//! Producers and consumers transfer arbitrary serialized messages through a
//! process-shared mutex and two condition variables guarding a wrap-around
//! byte ring. The point is *bulk* transfer: [`Queue::put_many`] and
//! [`Queue::get_many`] move many messages under a single lock acquisition,
//! amortizing synchronization overhead in fan-in/fan-out workloads.
//!
//! # What this crate does *not* do
//!
//! Serialization of values into bytes, allocation of the shared-memory
//! segment's backing file, and process spawning are all external
//! collaborators: the core only consumes a [`Codec<T>`] and an OS-mapped
//! region. Strict FIFO ordering across *distinct* producers, priority,
//! persistence, and zero-copy transfer of large buffers are non-goals.
//!
//! # Example
//!
//! ```
//! use ringshm_rs::{Queue, QueueConfig};
//! use ringshm_rs::codecs::BytesCodec;
//!
//! let queue = Queue::<Vec<u8>, _>::new(QueueConfig::with_capacity(4096), BytesCodec)?;
//!
//! queue.put_nowait(&b"hello".to_vec())?;
//! assert_eq!(queue.size()?, 1);
//! assert_eq!(queue.get_nowait()?, b"hello".to_vec());
//! # Ok::<(), ringshm_rs::QueueError>(())
//! ```

#[cfg(not(unix))]
compile_error!("ringshm-rs uses shm_open/mmap/pthread_* and only builds on Unix targets");

mod codec;
mod config;
mod error;
mod framing;
mod handle;
mod layout;
mod metrics;
mod queue;
mod scratch;
mod sync;

pub use codec::Codec;
pub use config::{QueueConfig, HIGH_FANOUT_CONFIG, LARGE_MESSAGE_CONFIG};
pub use error::{BoxError, QueueError, Result};
pub use handle::QueueHandle;
pub use metrics::{Metrics, MetricsSnapshot};
pub use queue::Queue;

/// Built-in [`Codec`] implementations.
pub mod codecs {
    pub use crate::codec::BytesCodec;
    #[cfg(feature = "bincode")]
    pub use crate::codec::BincodeCodec;
}
