//! Named POSIX shared-memory segments.
//!
//! Each segment is a `shm_open` + `mmap` mapping with a trailing
//! `AtomicI32` reference counter shared by every process that maps it. The
//! counter is what guards teardown: the backing object is unlinked only when
//! the last party detaches, so a segment outlives whichever endpoint exits
//! first.

#![cfg(unix)]

use std::ffi::CString;
use std::io;
use std::ptr;
use std::sync::atomic::{AtomicI32, Ordering};

/// Open mode for a named segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmMode {
    /// Create exclusively; fail if the name already exists.
    Create,
    /// Open an existing segment; fail if the name does not exist.
    Open,
    /// Create if missing, attach if it already exists.
    CreateOrOpen,
}

// The trailing ref counter is appended after the user region, aligned to its
// own size.
const ACC_ALIGN: usize = std::mem::align_of::<AtomicI32>();

fn total_size(user_size: usize) -> usize {
    let aligned = ((user_size.wrapping_sub(1) / ACC_ALIGN) + 1) * ACC_ALIGN;
    aligned + std::mem::size_of::<AtomicI32>()
}

/// Reference to the trailing ref counter of a mapping of `total` bytes.
///
/// # Safety
///
/// `mem` must point to a live mapping of at least `total` bytes.
unsafe fn acc_of(mem: *mut u8, total: usize) -> &'static AtomicI32 {
    let offset = total - std::mem::size_of::<AtomicI32>();
    &*(mem.add(offset) as *const AtomicI32)
}

fn posix_name(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    }
}

/// A named, sized, sharable memory segment.
///
/// The user-visible region starts at [`as_mut_ptr`](ShmSegment::as_mut_ptr)
/// and spans [`user_size`](ShmSegment::user_size) bytes; the mapping is
/// page-aligned, freshly-created segments are zero-filled by `ftruncate`.
pub struct ShmSegment {
    mem: *mut u8,
    total: usize,
    user: usize,
    name: String,
    created: bool,
}

// Safety: the region is process-shared by design; all cross-party state
// inside it is accessed through atomics by the queue layer.
unsafe impl Send for ShmSegment {}
unsafe impl Sync for ShmSegment {}

impl ShmSegment {
    /// Creates or attaches a named segment of `user_size` bytes.
    pub fn acquire(name: &str, user_size: usize, mode: ShmMode) -> io::Result<Self> {
        if name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "segment name is empty"));
        }
        if user_size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "segment size is zero"));
        }

        let name = posix_name(name);
        let c_name = CString::new(name.as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let perms: libc::mode_t = 0o666;
        let total = total_size(user_size);

        // For CreateOrOpen, try the exclusive create first so ftruncate only
        // runs on an object we own; truncating a live peer's segment would
        // zero it out from under them.
        let (fd, created) = match mode {
            ShmMode::Create => {
                let fd = unsafe {
                    libc::shm_open(
                        c_name.as_ptr(),
                        libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                        perms as libc::c_uint,
                    )
                };
                if fd == -1 {
                    return Err(io::Error::last_os_error());
                }
                (fd, true)
            }
            ShmMode::Open => {
                let fd =
                    unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, perms as libc::c_uint) };
                if fd == -1 {
                    return Err(io::Error::last_os_error());
                }
                (fd, false)
            }
            ShmMode::CreateOrOpen => {
                let fd = unsafe {
                    libc::shm_open(
                        c_name.as_ptr(),
                        libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                        perms as libc::c_uint,
                    )
                };
                if fd != -1 {
                    (fd, true)
                } else {
                    let e = io::Error::last_os_error();
                    if e.raw_os_error() != Some(libc::EEXIST) {
                        return Err(e);
                    }
                    let fd = unsafe {
                        libc::shm_open(c_name.as_ptr(), libc::O_RDWR, perms as libc::c_uint)
                    };
                    if fd == -1 {
                        return Err(io::Error::last_os_error());
                    }
                    (fd, false)
                }
            }
        };

        if created {
            let ret = unsafe { libc::ftruncate(fd, total as libc::off_t) };
            if ret != 0 {
                let err = io::Error::last_os_error();
                unsafe {
                    libc::close(fd);
                    libc::shm_unlink(c_name.as_ptr());
                }
                return Err(err);
            }
        }

        let mem = unsafe {
            libc::mmap(
                ptr::null_mut(),
                total,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };
        if mem == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        let mem = mem.cast::<u8>();
        unsafe { acc_of(mem, total).fetch_add(1, Ordering::AcqRel) };

        Ok(Self {
            mem,
            total,
            user: user_size,
            name,
            created,
        })
    }

    /// Pointer to the start of the user-visible region.
    #[inline]
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.mem
    }

    /// Bytes usable by the caller (excludes the trailing ref counter).
    #[inline]
    pub fn user_size(&self) -> usize {
        self.user
    }

    /// The POSIX name this segment was opened under.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this handle's `acquire` created the backing object.
    #[inline]
    pub fn created(&self) -> bool {
        self.created
    }

    /// Parties currently mapping the segment.
    pub fn ref_count(&self) -> i32 {
        unsafe { acc_of(self.mem, self.total).load(Ordering::Acquire) }
    }

    /// Removes the backing object by name without an open handle. Live
    /// mappings survive until their owners detach.
    pub fn unlink_by_name(name: &str) {
        if let Ok(c_name) = CString::new(posix_name(name).into_bytes()) {
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
        }
    }
}

impl Drop for ShmSegment {
    fn drop(&mut self) {
        // Last party out unlinks the name so the object does not leak past
        // the queue's lifetime.
        let prev = unsafe { acc_of(self.mem, self.total).fetch_sub(1, Ordering::AcqRel) };
        unsafe { libc::munmap(self.mem.cast::<libc::c_void>(), self.total) };
        if prev <= 1 {
            Self::unlink_by_name(&self.name);
        }
    }
}
