//! Serializable queue identity for cross-process reattachment: `spec.md` §6.

use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// The serializable identity of a [`crate::Queue`]: everything a spawned
/// process needs to reattach to the same shared region without
/// reinitializing its synchronization objects (`spec.md` §3 Lifecycles,
/// §6 Handle transfer).
///
/// Deliberately does not carry a codec instance: the receiving process
/// supplies its own `Codec<T>` value to [`crate::Queue::open`] (mirroring
/// `original_source/faster_fifo_reduction/__init__.py`'s `reduce_queue`/
/// `rebuild_queue`, which likewise ship only the queue's identity, not its
/// serializer closures, across the `multiprocessing` boundary). `T` and `C`
/// are phantom, carried only so a handle can't be opened against the wrong
/// value or codec type by accident.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct QueueHandle<T, C> {
    pub(crate) name: String,
    pub(crate) capacity: usize,
    #[serde(skip)]
    _marker: PhantomData<fn() -> (T, C)>,
}

impl<T, C> QueueHandle<T, C> {
    pub(crate) fn new(name: String, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            _marker: PhantomData,
        }
    }

    /// The underlying shared-memory segment's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ring's fixed byte capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T, C> Clone for QueueHandle<T, C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            capacity: self.capacity,
            _marker: PhantomData,
        }
    }
}

impl<T, C> std::fmt::Debug for QueueHandle<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueHandle")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .finish()
    }
}
