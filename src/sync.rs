//! Process-shared synchronization primitives: one robust mutex and two
//! condition variables, all living inline in the shared region's header.
//!
//! This is the synchronization core from `spec.md` §4.2. Condition variables
//! are notification channels only: every waiter re-checks its predicate
//! after waking, so a spurious wakeup or a lost-wakeup race resolves to a
//! harmless retry rather than a correctness bug.
//!
//! Robust-mutex recovery (`EOWNERDEAD`) is only reported by glibc on Linux;
//! on other Unix targets the mutex is still `PTHREAD_PROCESS_SHARED` but not
//! `PTHREAD_MUTEX_ROBUST`, so a process that dies mid-critical-section wedges
//! every other attached process instead of being recovered. This matches the
//! documented fallback in `spec.md` §9 ("robust mutex on platforms without
//! one"). We do not implement the lock-file/lease-token fallback; we just
//! accept the reduced guarantee outside Linux.

use crate::error::{QueueError, Result};
use std::mem::MaybeUninit;
use std::time::Duration;

#[cfg(target_os = "linux")]
const WAIT_CLOCK: libc::clockid_t = libc::CLOCK_MONOTONIC;
#[cfg(not(target_os = "linux"))]
const WAIT_CLOCK: libc::clockid_t = libc::CLOCK_REALTIME;

fn check(rc: i32) -> Result<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(QueueError::System(std::io::Error::from_raw_os_error(rc)))
    }
}

/// An absolute point in time on [`WAIT_CLOCK`], or a sentinel for "block
/// forever" / "don't block at all". Computed once from a relative timeout so
/// spurious wakeups never reset the clock (`spec.md` §4.2).
#[derive(Clone, Copy)]
pub(crate) enum Deadline {
    Forever,
    NonBlocking,
    At(libc::timespec),
}

impl Deadline {
    /// `None` blocks forever; `Some(Duration::ZERO)` is non-blocking;
    /// `Some(d)` blocks for at most `d`.
    pub(crate) fn from_timeout(timeout: Option<Duration>) -> Self {
        match timeout {
            None => Self::Forever,
            Some(d) if d.is_zero() => Self::NonBlocking,
            Some(d) => {
                let mut now = MaybeUninit::<libc::timespec>::uninit();
                // SAFETY: WAIT_CLOCK is a valid clock id and `now` is a valid
                // out-pointer of the right type.
                unsafe {
                    libc::clock_gettime(WAIT_CLOCK, now.as_mut_ptr());
                }
                let now = unsafe { now.assume_init() };
                Self::At(add_duration(now, d))
            }
        }
    }
}

fn add_duration(ts: libc::timespec, d: Duration) -> libc::timespec {
    let mut sec = ts.tv_sec + d.as_secs() as libc::time_t;
    let mut nsec = ts.tv_nsec + i64::from(d.subsec_nanos());
    if nsec >= 1_000_000_000 {
        nsec -= 1_000_000_000;
        sec += 1;
    }
    libc::timespec {
        tv_sec: sec,
        tv_nsec: nsec,
    }
}

/// A `pthread_mutex_t` configured `PTHREAD_PROCESS_SHARED` and, on Linux,
/// `PTHREAD_MUTEX_ROBUST`.
///
/// Lives inline in the shared region; must be initialized exactly once, by
/// the process that creates the region, before any other process attaches
/// (`spec.md` §3 Lifecycles).
#[repr(transparent)]
pub(crate) struct RawMutex(libc::pthread_mutex_t);

// SAFETY: a PTHREAD_PROCESS_SHARED mutex is explicitly designed to be used
// concurrently from multiple threads/processes; all access goes through the
// pthread API, which synchronizes internally.
unsafe impl Send for RawMutex {}
unsafe impl Sync for RawMutex {}

impl RawMutex {
    /// # Safety
    /// Must be called exactly once, by the creating process, before the
    /// mutex is visible to any other attaching process, and `self` must live
    /// at a stable address (inside the shared mapping) for as long as any
    /// process holds a reference to it.
    pub(crate) unsafe fn init(&mut self) -> Result<()> {
        let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
        check(libc::pthread_mutexattr_init(attr.as_mut_ptr()))?;
        let mut attr = attr.assume_init();

        let res = (|| {
            check(libc::pthread_mutexattr_setpshared(
                &mut attr,
                libc::PTHREAD_PROCESS_SHARED,
            ))?;
            #[cfg(target_os = "linux")]
            check(libc::pthread_mutexattr_setrobust(
                &mut attr,
                libc::PTHREAD_MUTEX_ROBUST,
            ))?;
            check(libc::pthread_mutex_init(&mut self.0, &attr))
        })();

        libc::pthread_mutexattr_destroy(&mut attr);
        res
    }

    /// Blocking lock.
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_>> {
        let rc = unsafe { libc::pthread_mutex_lock(self.as_ptr()) };
        self.finish_lock(rc)
    }

    /// Non-blocking lock attempt. Returns `Ok(None)` if already held.
    pub(crate) fn try_lock(&self) -> Result<Option<MutexGuard<'_>>> {
        let rc = unsafe { libc::pthread_mutex_trylock(self.as_ptr()) };
        if rc == libc::EBUSY {
            return Ok(None);
        }
        self.finish_lock(rc).map(Some)
    }

    /// Shared tail of `lock`/`try_lock`/condvar-wait return handling: marks a
    /// robust mutex consistent and reports `InconsistentRecovered` instead of
    /// pretending the critical section ran.
    fn finish_lock(&self, rc: i32) -> Result<MutexGuard<'_>> {
        if rc == 0 {
            return Ok(MutexGuard { mutex: self });
        }
        #[cfg(target_os = "linux")]
        if rc == libc::EOWNERDEAD {
            // We now hold the mutex (that's what EOWNERDEAD means), but the
            // critical section it protected may be half-updated. Mark it
            // consistent so future lockers don't also see EOWNERDEAD, then
            // release it without touching ring state and report the error.
            unsafe {
                libc::pthread_mutex_consistent(self.as_ptr());
                libc::pthread_mutex_unlock(self.as_ptr());
            }
            return Err(QueueError::InconsistentRecovered);
        }
        Err(QueueError::System(std::io::Error::from_raw_os_error(rc)))
    }

    fn as_ptr(&self) -> *mut libc::pthread_mutex_t {
        std::ptr::addr_of!(self.0).cast_mut()
    }

    /// # Safety
    /// No other thread or process may lock (or be waiting on a condvar
    /// linked to) this mutex after this call returns.
    pub(crate) unsafe fn destroy(&mut self) {
        libc::pthread_mutex_destroy(self.as_ptr());
    }
}

/// RAII lock guard. Unlocks on drop unless consumed by a condvar wait.
pub(crate) struct MutexGuard<'a> {
    mutex: &'a RawMutex,
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_mutex_unlock(self.mutex.as_ptr());
        }
    }
}

/// A `pthread_cond_t` configured `PTHREAD_PROCESS_SHARED`, clocked on
/// [`WAIT_CLOCK`] where the platform allows choosing (Linux); elsewhere it
/// uses the platform default (`CLOCK_REALTIME`), which is what
/// `pthread_cond_timedwait`'s absolute deadline is interpreted against there.
#[repr(transparent)]
pub(crate) struct RawCondvar(libc::pthread_cond_t);

unsafe impl Send for RawCondvar {}
unsafe impl Sync for RawCondvar {}

impl RawCondvar {
    /// # Safety
    /// Same constraints as [`RawMutex::init`].
    pub(crate) unsafe fn init(&mut self) -> Result<()> {
        let mut attr = MaybeUninit::<libc::pthread_condattr_t>::uninit();
        check(libc::pthread_condattr_init(attr.as_mut_ptr()))?;
        let mut attr = attr.assume_init();

        let res = (|| {
            check(libc::pthread_condattr_setpshared(
                &mut attr,
                libc::PTHREAD_PROCESS_SHARED,
            ))?;
            #[cfg(target_os = "linux")]
            check(libc::pthread_condattr_setclock(&mut attr, WAIT_CLOCK))?;
            check(libc::pthread_cond_init(&mut self.0, &attr))
        })();

        libc::pthread_condattr_destroy(&mut attr);
        res
    }

    /// Wakes at most one waiter. Used after a batch of exactly one record
    /// (`spec.md` §4.2).
    pub(crate) fn signal(&self) {
        unsafe {
            libc::pthread_cond_signal(self.as_ptr());
        }
    }

    /// Wakes every waiter. Used after a batch of more than one record, and
    /// unconditionally on `close`.
    pub(crate) fn broadcast(&self) {
        unsafe {
            libc::pthread_cond_broadcast(self.as_ptr());
        }
    }

    /// Waits according to `deadline`, consuming and returning `guard`'s
    /// mutex. Returns `timed_out = true` if the deadline elapsed with no
    /// signal observed; the caller must still re-check its predicate either
    /// way (spurious wakeups are legal).
    ///
    /// `deadline` must be [`Deadline::At`]; callers are expected to have
    /// already handled `Forever`/`NonBlocking` themselves (the former calls
    /// [`Self::wait_forever`], the latter never waits at all).
    pub(crate) fn wait_until<'a>(
        &self,
        guard: MutexGuard<'a>,
        deadline: libc::timespec,
    ) -> Result<(MutexGuard<'a>, bool)> {
        let mutex = guard.mutex;
        std::mem::forget(guard);
        let rc = unsafe { libc::pthread_cond_timedwait(self.as_ptr(), mutex.as_ptr(), &deadline) };
        match rc {
            0 => Ok((MutexGuard { mutex }, false)),
            libc::ETIMEDOUT => Ok((MutexGuard { mutex }, true)),
            other => mutex.finish_lock(other).map(|g| (g, false)),
        }
    }

    /// Waits with no deadline.
    pub(crate) fn wait_forever<'a>(&self, guard: MutexGuard<'a>) -> Result<MutexGuard<'a>> {
        let mutex = guard.mutex;
        std::mem::forget(guard);
        let rc = unsafe { libc::pthread_cond_wait(self.as_ptr(), mutex.as_ptr()) };
        mutex.finish_lock(rc)
    }

    fn as_ptr(&self) -> *mut libc::pthread_cond_t {
        std::ptr::addr_of!(self.0).cast_mut()
    }

    /// # Safety
    /// No other thread or process may be waiting on this condvar after this
    /// call returns.
    pub(crate) unsafe fn destroy(&mut self) {
        libc::pthread_cond_destroy(self.as_ptr());
    }
}
