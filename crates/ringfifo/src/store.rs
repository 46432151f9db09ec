use std::alloc::{alloc, alloc_zeroed, dealloc, Layout};
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::FifoError;
use crate::index::Index;
use crate::shared::Cookie;
use crate::signal::Signal;

/// Default slot alignment when the caller does not specify one.
pub const DEFAULT_ALIGNMENT: usize = 16;

/// Checks the caller-supplied slot alignment: a power of two and a multiple
/// of the machine pointer size.
pub(crate) fn validate_alignment(align: usize) -> Result<(), FifoError> {
    let ptr_size = mem::size_of::<*const ()>();
    if align == 0 || !align.is_power_of_two() || align % ptr_size != 0 {
        return Err(FifoError::BadAlignment(align));
    }
    Ok(())
}

// ---------------------------------------------------------------------
// HELPER: 128-byte cache-aligned wrapper
// ---------------------------------------------------------------------

/// Wrapper ensuring 128-byte alignment to keep the two index cells (and the
/// control word) off each other's cache lines, including the adjacent line
/// the prefetcher may pull in. `repr(C)` so the header has one fixed layout
/// on both sides of a shared mapping.
#[repr(C, align(128))]
#[derive(Debug)]
pub(crate) struct CacheAligned<T> {
    value: T,
}

impl<T> CacheAligned<T> {
    const fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T> std::ops::Deref for CacheAligned<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

// ---------------------------------------------------------------------
// Queue header
// ---------------------------------------------------------------------

/// Cross-endpoint control word: init marker, handshake cookie, the
/// queue-global async signal cell, and the sticky writer-EOF flag.
#[repr(C)]
#[derive(Debug)]
pub struct Control {
    ready: AtomicU32,
    cookie: Cookie,
    async_signal: AtomicU32,
    write_finished: AtomicU32,
}

const READY_MAGIC: u32 = 0x5249_4e47; // "RING"

impl Control {
    fn new() -> Self {
        Self {
            ready: AtomicU32::new(0),
            cookie: Cookie::new(),
            async_signal: AtomicU32::new(0),
            write_finished: AtomicU32::new(0),
        }
    }
}

/// The queue's shared head state: both index cells plus the control word,
/// each on its own 128-byte line. The heap backing boxes one of these; the
/// shared backing maps it at the front of the `_ptr` segment.
#[repr(C)]
#[derive(Debug)]
pub struct Header {
    read_pt: CacheAligned<Index>,
    write_pt: CacheAligned<Index>,
    ctl: CacheAligned<Control>,
}

impl Header {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            read_pt: CacheAligned::new(Index::new(capacity)),
            write_pt: CacheAligned::new(Index::new(capacity)),
            ctl: CacheAligned::new(Control::new()),
        }
    }

    #[inline]
    pub(crate) fn read_pt(&self) -> &Index {
        &self.read_pt
    }

    #[inline]
    pub(crate) fn write_pt(&self) -> &Index {
        &self.write_pt
    }

    #[inline]
    pub(crate) fn cookie(&self) -> &Cookie {
        &self.ctl.cookie
    }

    #[inline]
    pub(crate) fn set_write_finished(&self) {
        self.ctl.write_finished.store(1, Ordering::Release);
    }

    #[inline]
    pub(crate) fn write_finished(&self) -> bool {
        self.ctl.write_finished.load(Ordering::Acquire) != 0
    }

    #[inline]
    pub(crate) fn send_signal(&self, signal: Signal) {
        self.ctl.async_signal.store(signal.as_raw(), Ordering::Release);
    }

    #[inline]
    pub(crate) fn get_signal(&self) -> Signal {
        Signal::from_raw(self.ctl.async_signal.load(Ordering::Acquire))
    }

    /// Marks the header initialized. Release-publishes every plain field
    /// written before it, so an attaching process that observes the marker
    /// also observes the capacity.
    fn publish_ready(&self) {
        self.ctl.ready.store(READY_MAGIC, Ordering::Release);
    }

    fn is_ready(&self) -> bool {
        self.ctl.ready.load(Ordering::Acquire) == READY_MAGIC
    }
}

// ---------------------------------------------------------------------
// Store abstraction
// ---------------------------------------------------------------------

/// Backing storage for one queue: the header plus the parallel payload and
/// signal arrays. Sealed to the crate; deployment variants implement it.
pub trait Store<T> {
    fn capacity(&self) -> usize;
    fn header(&self) -> &Header;
    fn slot_ptr(&self, index: usize) -> *mut T;
    fn signal_ptr(&self, index: usize) -> *mut Signal;

    /// Blocks until the peer endpoint is live. No-op for stores whose two
    /// endpoints share one process image.
    fn ensure_peer(&self) {}
}

// ---------------------------------------------------------------------
// Heap-backed store
// ---------------------------------------------------------------------

/// Process-local backing: payload and signal arrays allocated on the heap
/// with caller-supplied alignment, header boxed alongside.
pub struct HeapStore<T> {
    header: Box<Header>,
    slots: NonNull<T>,
    signals: NonNull<Signal>,
    slot_layout: Layout,
    signal_layout: Layout,
    capacity: usize,
    _marker: PhantomData<T>,
}

impl<T: Copy> HeapStore<T> {
    pub(crate) fn new(capacity: usize, align: usize) -> Result<Self, FifoError> {
        assert!(capacity > 0, "queue capacity must be non-zero");
        assert!(mem::size_of::<T>() > 0, "zero-sized element types are not supported");
        validate_alignment(align)?;

        let slot_align = align.max(mem::align_of::<T>());
        let slot_bytes = capacity
            .checked_mul(mem::size_of::<T>())
            .ok_or(FifoError::OutOfMemory(usize::MAX))?;
        let slot_layout = Layout::from_size_align(slot_bytes, slot_align)
            .map_err(|_| FifoError::BadAlignment(align))?;
        let signal_layout = Layout::from_size_align(capacity * mem::size_of::<Signal>(), align)
            .map_err(|_| FifoError::BadAlignment(align))?;

        // SAFETY: both layouts have non-zero size (capacity > 0, sizes > 0).
        let slots = unsafe { alloc(slot_layout) };
        let Some(slots) = NonNull::new(slots.cast::<T>()) else {
            return Err(FifoError::OutOfMemory(slot_layout.size()));
        };
        // Signal slots are zero-initialized: discriminant 0 is Signal::None.
        let signals = unsafe { alloc_zeroed(signal_layout) };
        let Some(signals) = NonNull::new(signals.cast::<Signal>()) else {
            // SAFETY: slots came from alloc with slot_layout just above.
            unsafe { dealloc(slots.as_ptr().cast::<u8>(), slot_layout) };
            return Err(FifoError::OutOfMemory(signal_layout.size()));
        };

        let header = Box::new(Header::new(capacity));
        header.publish_ready();

        Ok(Self {
            header,
            slots,
            signals,
            slot_layout,
            signal_layout,
            capacity,
            _marker: PhantomData,
        })
    }
}

impl<T> Store<T> for HeapStore<T> {
    #[inline]
    fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    fn header(&self) -> &Header {
        &self.header
    }

    #[inline]
    fn slot_ptr(&self, index: usize) -> *mut T {
        debug_assert!(index < self.capacity);
        // SAFETY: index is within the allocation by the ring protocol.
        unsafe { self.slots.as_ptr().add(index) }
    }

    #[inline]
    fn signal_ptr(&self, index: usize) -> *mut Signal {
        debug_assert!(index < self.capacity);
        // SAFETY: as above; the arrays are co-indexed.
        unsafe { self.signals.as_ptr().add(index) }
    }
}

impl<T> Drop for HeapStore<T> {
    fn drop(&mut self) {
        // Element type is plain data (Copy); only the raw arrays need
        // releasing.
        unsafe {
            dealloc(self.slots.as_ptr().cast::<u8>(), self.slot_layout);
            dealloc(self.signals.as_ptr().cast::<u8>(), self.signal_layout);
        }
    }
}

// ---------------------------------------------------------------------
// Shared-memory store
// ---------------------------------------------------------------------

#[cfg(unix)]
pub use self::shared_store::SharedStore;

#[cfg(unix)]
mod shared_store {
    use std::marker::PhantomData;
    use std::mem;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    use super::{validate_alignment, Header, Store};
    use crate::backoff::Backoff;
    use crate::error::FifoError;
    use crate::shared::Direction;
    use crate::shm::{ShmMode, ShmSegment};
    use crate::signal::Signal;

    // mmap mappings are page-aligned; stricter requests cannot be honored.
    const PAGE_SIZE: usize = 4096;

    // How long an attaching endpoint waits for the creator to finish
    // initializing the header before declaring the segment bad.
    const INIT_GRACE: Duration = Duration::from_secs(5);

    /// Cross-process backing: three named segments keyed by a base string —
    /// `<key>_store` (payloads), `<key>_key` (signals), `<key>_ptr` (header).
    /// First endpoint to arrive creates and initializes; the second attaches
    /// and validates geometry.
    pub struct SharedStore<T> {
        // Declaration order is teardown order: header last, so the index
        // cells outlive any in-flight observer of the arrays.
        store_seg: ShmSegment,
        signal_seg: ShmSegment,
        ptr_seg: ShmSegment,
        capacity: usize,
        direction: Direction,
        peer_seen: AtomicBool,
        _marker: PhantomData<T>,
    }

    fn segment(name: String, bytes: usize) -> Result<ShmSegment, FifoError> {
        ShmSegment::acquire(&name, bytes, ShmMode::CreateOrOpen).map_err(|e| {
            FifoError::BadSharedMemory {
                name,
                reason: e.to_string(),
            }
        })
    }

    impl<T: Copy> SharedStore<T> {
        pub(crate) fn new(
            capacity: usize,
            key: &str,
            direction: Direction,
            align: usize,
        ) -> Result<Self, FifoError> {
            assert!(capacity > 0, "queue capacity must be non-zero");
            assert!(mem::size_of::<T>() > 0, "zero-sized element types are not supported");
            validate_alignment(align)?;
            if align > PAGE_SIZE || mem::align_of::<T>() > PAGE_SIZE {
                return Err(FifoError::BadAlignment(align));
            }

            let store_seg = segment(format!("{key}_store"), capacity * mem::size_of::<T>())?;
            let signal_seg = segment(format!("{key}_key"), capacity * mem::size_of::<Signal>())?;
            let ptr_seg = segment(format!("{key}_ptr"), mem::size_of::<Header>())?;

            let hdr_ptr = ptr_seg.as_mut_ptr().cast::<Header>();
            if ptr_seg.created() {
                // SAFETY: we own a freshly ftruncate'd (zeroed) mapping large
                // enough for a Header; no other party touches it until the
                // ready marker is published below.
                unsafe { hdr_ptr.write(Header::new(capacity)) };
                unsafe { (*hdr_ptr).publish_ready() };
            } else {
                // SAFETY: mapping is at least size_of::<Header>() bytes; the
                // ready marker gates every non-atomic field behind an
                // acquire load.
                let hdr = unsafe { &*hdr_ptr };
                let deadline = Instant::now() + INIT_GRACE;
                let mut backoff = Backoff::new();
                while !hdr.is_ready() {
                    if Instant::now() >= deadline {
                        return Err(FifoError::BadSharedMemory {
                            name: ptr_seg.name().to_string(),
                            reason: "creator never initialized the header".to_string(),
                        });
                    }
                    backoff.snooze();
                }
                if hdr.read_pt().capacity() != capacity {
                    return Err(FifoError::BadSharedMemory {
                        name: ptr_seg.name().to_string(),
                        reason: format!(
                            "capacity mismatch: segment holds {}, caller asked {capacity}",
                            hdr.read_pt().capacity()
                        ),
                    });
                }
            }

            // SAFETY: header is initialized (either path above).
            let hdr = unsafe { &*hdr_ptr };
            // Exactly one writer and one reader per queue instance: a second
            // endpoint claiming an already-announced direction is the
            // multi-producer/multi-consumer misuse the contract forbids.
            if hdr.cookie().already_announced(direction) {
                return Err(FifoError::ContractViolation(
                    "queue direction already claimed by another endpoint",
                ));
            }
            hdr.cookie().announce(direction);

            Ok(Self {
                store_seg,
                signal_seg,
                ptr_seg,
                capacity,
                direction,
                peer_seen: AtomicBool::new(false),
                _marker: PhantomData,
            })
        }

        pub(crate) fn direction(&self) -> Direction {
            self.direction
        }

        /// Bounded handshake wait; `PeerNotReady` after `grace`.
        pub(crate) fn wait_for_peer(&self, grace: Duration) -> Result<(), FifoError> {
            if self.peer_seen.load(Ordering::Relaxed) {
                return Ok(());
            }
            let deadline = Instant::now() + grace;
            let mut backoff = Backoff::new();
            while !self.header().cookie().both_present() {
                if Instant::now() >= deadline {
                    return Err(FifoError::PeerNotReady(grace));
                }
                backoff.snooze();
            }
            self.peer_seen.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    impl<T> Store<T> for SharedStore<T> {
        #[inline]
        fn capacity(&self) -> usize {
            self.capacity
        }

        #[inline]
        fn header(&self) -> &Header {
            // SAFETY: the mapping holds an initialized Header for the life
            // of self (validated in new).
            unsafe { &*self.ptr_seg.as_mut_ptr().cast::<Header>() }
        }

        #[inline]
        fn slot_ptr(&self, index: usize) -> *mut T {
            debug_assert!(index < self.capacity);
            // SAFETY: segment spans capacity slots; index bounded by the
            // ring protocol.
            unsafe { self.store_seg.as_mut_ptr().cast::<T>().add(index) }
        }

        #[inline]
        fn signal_ptr(&self, index: usize) -> *mut Signal {
            debug_assert!(index < self.capacity);
            // SAFETY: as above; arrays are co-indexed.
            unsafe { self.signal_seg.as_mut_ptr().cast::<Signal>().add(index) }
        }

        fn ensure_peer(&self) {
            if self.peer_seen.load(Ordering::Relaxed) {
                return;
            }
            let mut backoff = Backoff::new();
            while !self.header().cookie().both_present() {
                backoff.snooze();
            }
            self.peer_seen.store(true, Ordering::Relaxed);
        }
    }
}
