//! The public `Queue<T, C>` surface: `spec.md` §4.3–§4.5, §4.7, §6.
//!
//! A cheaply-`Clone`-able front door (`Arc<QueueInner<C>>` underneath) handed
//! to each cooperating thread or process. Each clone also gets its own fresh
//! scratch buffer (`spec.md` §4.6, §9 "Per-handle not serialized"), which is
//! why `Queue` implements `Clone` by hand instead of deriving it.

use crate::codec::Codec;
use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::handle::QueueHandle;
use crate::layout::{unique_name, SharedRegion};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::scratch::Scratch;
use crate::sync::Deadline;
use crate::framing;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

struct QueueInner<C> {
    region: SharedRegion,
    codec: C,
    metrics: Metrics,
    config: QueueConfig,
}

/// A bounded, multi-producer/multi-consumer FIFO queue backed by a single
/// shared-memory ring (`spec.md` §1–§3).
///
/// `Queue` is cheap to [`Clone`]: clones share the same underlying region
/// and codec but each get their own scratch buffer, so the idiomatic way to
/// hand a queue to another thread (or, via [`Queue::handle`] and
/// [`Queue::open`], another process) is to clone it rather than wrap it in
/// an `Arc` yourself: wrapping it in `Arc` and sharing one clone across
/// threads would serialize all of those threads' scratch-buffer use through
/// a single `RefCell`, defeating the point.
pub struct Queue<T, C: Codec<T>> {
    inner: Arc<QueueInner<C>>,
    scratch: RefCell<Scratch>,
    _marker: PhantomData<fn() -> T>,
}

// `Queue` is `Send` whenever `C` is (its `RefCell<Scratch>` scratch buffer
// is thread-local in spirit, not shared) but deliberately not `Sync`: the
// `RefCell` means two threads calling `put`/`get` through the *same* `Queue`
// value at once would panic on a borrow conflict rather than race, which is
// exactly the "not shared" guarantee `spec.md` §4.6 describes for scratch
// buffers. Clone a `Queue` per thread instead of sharing one behind an `Arc`.

impl<T, C: Codec<T>> Queue<T, C> {
    /// Creates a new queue backed by a freshly allocated shared-memory
    /// region with a process-unique name.
    pub fn new(config: QueueConfig, codec: C) -> Result<Self> {
        let name = unique_name();
        let region = SharedRegion::create(&name, config.capacity_bytes)?;
        tracing::debug!(queue = %name, capacity = config.capacity_bytes, "created shared-memory queue");
        Ok(Self::from_parts(region, config, codec))
    }

    /// Re-attaches to a queue previously obtained via [`Queue::handle`], for
    /// example after a `fork`+`exec` or `spawn` into a new process
    /// (`spec.md` §3 Lifecycles, §6 Handle transfer). Does not reinitialize
    /// the shared region's synchronization objects.
    pub fn open(handle: &QueueHandle<T, C>, codec: C) -> Result<Self> {
        let region = SharedRegion::attach(handle.name(), handle.capacity())?;
        tracing::debug!(queue = %handle.name(), "attached to shared-memory queue");
        let config = QueueConfig::with_capacity(handle.capacity());
        Ok(Self::from_parts(region, config, codec))
    }

    fn from_parts(region: SharedRegion, config: QueueConfig, codec: C) -> Self {
        let scratch = Scratch::new(config.initial_scratch_bytes, region.capacity());
        let inner = Arc::new(QueueInner {
            region,
            codec,
            metrics: Metrics::new(),
            config,
        });
        Self {
            inner,
            scratch: RefCell::new(scratch),
            _marker: PhantomData,
        }
    }

    /// Returns this queue's serializable identity, for reattaching from
    /// another process via [`Queue::open`].
    pub fn handle(&self) -> QueueHandle<T, C> {
        QueueHandle::new(
            self.inner.region.name().to_string(),
            self.inner.region.capacity(),
        )
    }

    /// Forwards a lock/wait result unchanged, but first logs
    /// [`QueueError::InconsistentRecovered`] (`spec.md` §4.9): a prior holder
    /// died mid-critical-section, the mutex has been marked consistent, and
    /// this operation did not execute. Naming the queue's identity here is
    /// the seam an operator watching logs would use to notice a crashed peer.
    fn note_lock_result<G>(&self, result: Result<G>) -> Result<G> {
        if let Err(QueueError::InconsistentRecovered) = &result {
            tracing::warn!(
                queue = %self.inner.region.name(),
                "robust mutex recovered after prior holder died"
            );
        }
        result
    }

    /// Enqueues a single value, serializing it outside the critical section.
    pub fn put(&self, value: &T, block: bool, timeout: Option<Duration>) -> Result<()> {
        self.put_many(std::slice::from_ref(value), block, timeout)
    }

    /// Non-blocking shorthand for `put(value, false, None)`.
    pub fn put_nowait(&self, value: &T) -> Result<()> {
        self.put(value, false, None)
    }

    /// Enqueues a batch of values as a single atomic operation: either the
    /// whole batch lands under one lock acquisition, or none of it does
    /// (`spec.md` §4.3 batch atomicity).
    pub fn put_many(&self, values: &[T], block: bool, timeout: Option<Duration>) -> Result<()> {
        let mut encoded = Vec::with_capacity(values.len());
        for value in values {
            encoded.push(
                self.inner
                    .codec
                    .encode(value)
                    .map_err(QueueError::Serialize)?,
            );
        }
        let refs: Vec<&[u8]> = encoded.iter().map(Vec::as_slice).collect();
        let total: usize = refs.iter().map(|r| framing::framed_size(r.len())).sum();
        let capacity = self.inner.region.capacity();
        if total > capacity {
            return Err(QueueError::TooLarge {
                needed: total,
                capacity,
            });
        }
        let n = refs.len();

        let header = self.inner.region.header();
        let deadline = if block {
            Deadline::from_timeout(timeout)
        } else {
            Deadline::NonBlocking
        };

        let mut guard = self.note_lock_result(header.mutex.lock())?;
        loop {
            if header.used.get() + total <= header.capacity {
                break;
            }
            if header.closed.get() {
                return Err(QueueError::Closed);
            }
            match deadline {
                Deadline::NonBlocking => return Err(QueueError::Full),
                Deadline::Forever => {
                    guard = self.note_lock_result(header.cv_not_full.wait_forever(guard))?;
                }
                Deadline::At(ts) => {
                    let (g, timed_out) =
                        self.note_lock_result(header.cv_not_full.wait_until(guard, ts))?;
                    guard = g;
                    if timed_out && header.used.get() + total > header.capacity {
                        return Err(QueueError::Full);
                    }
                }
            }
        }

        // SAFETY: `guard` proves we hold `header.mutex`.
        let ring = unsafe { self.inner.region.ring_mut() };
        let (new_tail, written) = framing::write_records(ring, header.tail.get(), &refs);
        debug_assert_eq!(written, total);
        header.tail.set(new_tail);
        header.used.set(header.used.get() + written);
        header.count.set(header.count.get() + n);

        if n == 1 {
            header.cv_not_empty.signal();
        } else {
            header.cv_not_empty.broadcast();
        }
        if self.inner.config.enable_metrics {
            self.inner.metrics.record_put(n as u64);
        }
        drop(guard);
        Ok(())
    }

    /// Dequeues a single value. Specialization of [`Queue::get_many`] with
    /// `max_messages == 1`.
    pub fn get(&self, block: bool, timeout: Option<Duration>) -> Result<T> {
        let mut values = self.get_many(1, block, timeout, None)?;
        match values.pop() {
            Some(value) => Ok(value),
            None => unreachable!("get_many(1) returns a non-empty Vec whenever it succeeds"),
        }
    }

    /// Non-blocking shorthand for `get(false, None)`.
    pub fn get_nowait(&self) -> Result<T> {
        self.get(false, None)
    }

    /// Dequeues up to `max_messages` values in a single lock acquisition.
    /// Guarantees at least one value on success, but a partial batch (fewer
    /// than `max_messages`) is normal and expected (`spec.md` §4.4).
    ///
    /// `max_bytes` caps how many payload bytes are copied into the scratch
    /// buffer this call; it defaults to the scratch buffer's current size.
    pub fn get_many(
        &self,
        max_messages: usize,
        block: bool,
        timeout: Option<Duration>,
        max_bytes: Option<usize>,
    ) -> Result<Vec<T>> {
        assert!(max_messages > 0, "max_messages must be positive");

        loop {
            match self.try_get_many_once(max_messages, block, timeout, max_bytes)? {
                GetOutcome::Values(values) => return Ok(values),
                GetOutcome::NeedsLargerScratch => {
                    let mut scratch = self.scratch.borrow_mut();
                    if !scratch.grow() {
                        // Unreachable: put*/put_many reject anything whose
                        // framed size exceeds ring capacity, and the
                        // scratch ceiling is exactly that capacity, so the
                        // single largest possible payload always eventually
                        // fits.
                        unreachable!("scratch cannot grow past a payload that was ever enqueued");
                    }
                    if self.inner.config.enable_metrics {
                        self.inner.metrics.record_scratch_growth();
                    }
                    tracing::trace!(
                        queue = %self.inner.region.name(),
                        new_len = scratch.len(),
                        "grew scratch buffer"
                    );
                }
            }
        }
    }

    /// Runs the wait-then-parse sequence once. Returns
    /// [`GetOutcome::NeedsLargerScratch`] (having already released the
    /// mutex) when the first resident record doesn't fit the caller's
    /// scratch, so growth happens outside the critical section
    /// (`spec.md` §4.6).
    fn try_get_many_once(
        &self,
        max_messages: usize,
        block: bool,
        timeout: Option<Duration>,
        max_bytes: Option<usize>,
    ) -> Result<GetOutcome<T>> {
        let header = self.inner.region.header();
        let deadline = if block {
            Deadline::from_timeout(timeout)
        } else {
            Deadline::NonBlocking
        };

        let mut guard = self.note_lock_result(header.mutex.lock())?;
        loop {
            if header.used.get() > 0 {
                break;
            }
            if header.closed.get() {
                return Err(QueueError::Closed);
            }
            match deadline {
                Deadline::NonBlocking => return Err(QueueError::Empty),
                Deadline::Forever => {
                    guard = self.note_lock_result(header.cv_not_empty.wait_forever(guard))?;
                }
                Deadline::At(ts) => {
                    let (g, timed_out) =
                        self.note_lock_result(header.cv_not_empty.wait_until(guard, ts))?;
                    guard = g;
                    if timed_out && header.used.get() == 0 {
                        return Err(QueueError::Empty);
                    }
                }
            }
        }

        let mut scratch = self.scratch.borrow_mut();
        let scratch_cap = max_bytes.unwrap_or_else(|| scratch.len());
        // SAFETY: `guard` proves we hold `header.mutex`.
        let ring = unsafe { self.inner.region.ring_mut() };
        let (ranges, consumed) = framing::read_records(
            ring,
            header.head.get(),
            header.used.get(),
            scratch.as_mut_slice(),
            max_messages,
            scratch_cap,
        );

        if ranges.is_empty() {
            // `used > 0` but nothing was parsed: the first record's payload
            // doesn't fit the scratch buffer. Release the lock before the
            // caller grows it (spec.md §4.6).
            drop(guard);
            return Ok(GetOutcome::NeedsLargerScratch);
        }

        let n = ranges.len();
        header.head.set((header.head.get() + consumed) % header.capacity);
        header.used.set(header.used.get() - consumed);
        header.count.set(header.count.get() - n);

        if n == 1 {
            header.cv_not_full.signal();
        } else {
            header.cv_not_full.broadcast();
        }
        if self.inner.config.enable_metrics {
            self.inner.metrics.record_get(n as u64);
        }
        drop(guard);

        let scratch_slice = scratch.as_mut_slice();
        let mut values = Vec::with_capacity(n);
        for (start, len) in ranges {
            let bytes = &scratch_slice[start..start + len];
            values.push(self.inner.codec.decode(bytes).map_err(QueueError::Deserialize)?);
        }
        Ok(GetOutcome::Values(values))
    }

    /// The number of complete records currently resident in the ring.
    pub fn size(&self) -> Result<usize> {
        let header = self.inner.region.header();
        let _guard = self.note_lock_result(header.mutex.lock())?;
        Ok(header.count.get())
    }

    /// `true` if no records are resident.
    pub fn empty(&self) -> Result<bool> {
        Ok(self.size()? == 0)
    }

    /// `true` if there is no room for even a single zero-length record.
    pub fn full(&self) -> Result<bool> {
        let header = self.inner.region.header();
        let _guard = self.note_lock_result(header.mutex.lock())?;
        Ok(header.used.get() + framing::framed_size(0) > header.capacity)
    }

    /// `true` once [`Queue::close`] has been called on any handle sharing
    /// this region.
    pub fn is_closed(&self) -> Result<bool> {
        let header = self.inner.region.header();
        let _guard = self.note_lock_result(header.mutex.lock())?;
        Ok(header.closed.get())
    }

    /// Idempotent shutdown: wakes every blocked waiter, after which `put*`
    /// fails with [`QueueError::Closed`] and `get*` drains any remaining
    /// records before doing the same (`spec.md` §4.7).
    pub fn close(&self) -> Result<()> {
        let header = self.inner.region.header();
        let guard = self.note_lock_result(header.mutex.lock())?;
        header.closed.set(true);
        header.cv_not_empty.broadcast();
        header.cv_not_full.broadcast();
        drop(guard);
        tracing::debug!(queue = %self.inner.region.name(), "queue closed");
        Ok(())
    }

    /// A point-in-time snapshot of this handle's activity counters
    /// (`spec.md` §4.8). Counters are per-handle, not aggregated across
    /// clones or processes.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }
}

impl<T, C: Codec<T>> Clone for Queue<T, C> {
    fn clone(&self) -> Self {
        let scratch = Scratch::new(
            self.inner.config.initial_scratch_bytes,
            self.inner.region.capacity(),
        );
        Self {
            inner: Arc::clone(&self.inner),
            scratch: RefCell::new(scratch),
            _marker: PhantomData,
        }
    }
}

enum GetOutcome<T> {
    Values(Vec<T>),
    NeedsLargerScratch,
}
