use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of one endpoint's per-frame counters: items moved since the last
/// reset, and whether the endpoint hit a full/empty wait in that window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Blocked {
    /// Elements pushed (writer side) or popped (reader side).
    pub count: u32,
    /// The endpoint entered its wait loop at least once.
    pub blocked: bool,
}

const BLOCKED_BIT: u64 = 1 << 32;
const COUNT_MASK: u64 = u32::MAX as u64;

/// A 64-bit cell packing a 32-bit item count with a 32-bit blocked flag.
///
/// The owning endpoint is the only writer on the data path and updates with
/// a plain load + store — no read-modify-write, since nothing races it but
/// the sampler's reset. The sampler reads and zeroes the whole cell with one
/// atomic swap. An owner update that straddles a reset can lose that frame's
/// increments; the sampler tolerates the brief under-count.
#[repr(transparent)]
#[derive(Debug)]
pub struct BlockedCounter(AtomicU64);

impl BlockedCounter {
    /// Creates a zeroed counter.
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Owner-side: adds `n` to the item count, saturating at the field width.
    #[inline]
    pub fn add(&self, n: u32) {
        let cur = self.0.load(Ordering::Relaxed);
        let count = (cur & COUNT_MASK).saturating_add(u64::from(n)) & COUNT_MASK;
        self.0.store((cur & BLOCKED_BIT) | count, Ordering::Relaxed);
    }

    /// Owner-side: marks this endpoint blocked for the current frame.
    #[inline]
    pub fn set_blocked(&self) {
        let cur = self.0.load(Ordering::Relaxed);
        self.0.store(cur | BLOCKED_BIT, Ordering::Relaxed);
    }

    /// Sampler-side: atomically reads and zeroes the cell.
    #[inline]
    pub fn take(&self) -> Blocked {
        let raw = self.0.swap(0, Ordering::AcqRel);
        Blocked {
            count: (raw & COUNT_MASK) as u32,
            blocked: raw & BLOCKED_BIT != 0,
        }
    }
}

impl Default for BlockedCounter {
    fn default() -> Self {
        Self::new()
    }
}
