use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crossbeam_utils::CachePadded;

use crate::blocked::{Blocked, BlockedCounter};
use crate::error::FifoError;
use crate::signal::Signal;

/// Infinite sink/source used for rate calibration.
///
/// Presents the full queue operation set but never blocks on either side:
/// the producer always finds space, the consumer always finds an element.
/// Payloads are not persisted — every write lands in a single scratch slot
/// and every read yields the element type's default — so the only state
/// that accumulates is the traffic counters the sampler consumes. Reported
/// occupancy is always zero and free space always the nominal capacity.
///
/// Synchronous signals are counted but not delivered (there is no element
/// to pair them with); `Signal::Eof` still latches the writer-finished flag
/// and the async cell works as on a real queue.
pub struct InfiniteFifo<T: Copy> {
    /// Producer-only scratch target for `allocate`.
    write_slot: UnsafeCell<T>,
    /// Frozen value every consumer-side read yields.
    read_slot: T,
    capacity: usize,
    read_stats: CachePadded<BlockedCounter>,
    write_stats: CachePadded<BlockedCounter>,
    async_signal: AtomicU32,
    write_finished: AtomicBool,
    allocate_called: AtomicBool,
}

// Safety: write_slot is touched only by the producer endpoint; everything
// crossing endpoints is atomic.
unsafe impl<T: Copy + Send> Send for InfiniteFifo<T> {}
unsafe impl<T: Copy + Send> Sync for InfiniteFifo<T> {}

impl<T: Copy + Default> InfiniteFifo<T> {
    /// Creates a calibration queue reporting `capacity` nominal slots.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            write_slot: UnsafeCell::new(T::default()),
            read_slot: T::default(),
            capacity,
            read_stats: CachePadded::new(BlockedCounter::new()),
            write_stats: CachePadded::new(BlockedCounter::new()),
            async_signal: AtomicU32::new(0),
            write_finished: AtomicBool::new(false),
            allocate_called: AtomicBool::new(false),
        }
    }
}

impl<T: Copy> InfiniteFifo<T> {
    /// Always zero: nothing is retained.
    #[inline]
    pub fn size(&self) -> usize {
        0
    }

    /// Always the nominal capacity: the sink never fills.
    #[inline]
    pub fn space_avail(&self) -> usize {
        self.capacity
    }

    /// Nominal slot count.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Writable scratch slot; never blocks.
    pub fn allocate(&self) -> &mut T {
        self.allocate_called.store(true, Ordering::Relaxed);
        // SAFETY: producer-only scratch, single-producer contract.
        unsafe { &mut *self.write_slot.get() }
    }

    /// Counts the committed element, discarding its payload. `Signal::Eof`
    /// latches the writer-finished flag.
    pub fn commit(&self, signal: Signal) {
        if !self.allocate_called.swap(false, Ordering::Relaxed) {
            return;
        }
        if signal.is_eof() {
            self.write_finished.store(true, Ordering::Release);
        }
        self.write_stats.add(1);
    }

    /// Accepts and discards `item`; never blocks.
    pub fn push(&self, item: T, signal: Signal) {
        *self.allocate() = item;
        self.commit(signal);
    }

    /// Accepts and discards a whole range; the final element's `signal`
    /// receives EOF treatment as on a real queue.
    pub fn insert(&self, items: &[T], signal: Signal) {
        let Some((last, rest)) = items.split_last() else {
            return;
        };
        for &item in rest {
            self.push(item, Signal::None);
        }
        self.push(*last, signal);
    }

    /// Yields the default element; never blocks.
    pub fn pop_signaled(&self) -> (T, Signal) {
        self.read_stats.add(1);
        (self.read_slot, Signal::None)
    }

    /// Yields the default element; never blocks.
    #[inline]
    pub fn pop(&self) -> T {
        self.pop_signaled().0
    }

    /// Fills `out` with default elements, counting `out.len()` departures.
    pub fn pop_range(&self, out: &mut [T], signals: Option<&mut [Signal]>) {
        if out.is_empty() {
            return;
        }
        if let Some(sigs) = signals {
            assert_eq!(sigs.len(), out.len(), "signal buffer length must match item buffer length");
            sigs.fill(Signal::None);
        }
        out.fill(self.read_slot);
        self.read_stats.add(out.len() as u32);
    }

    /// Borrows the frozen read slot; never blocks, never advances.
    pub fn peek(&self) -> &T {
        &self.read_slot
    }

    /// As [`peek`](InfiniteFifo::peek), with the (always absent) signal.
    pub fn peek_signaled(&self) -> (&T, Signal) {
        (&self.read_slot, Signal::None)
    }

    /// Counts `range` departures without touching storage.
    pub fn recycle(&self, range: usize) -> Result<(), FifoError> {
        if range > self.capacity {
            return Err(FifoError::CapacityExceeded {
                range,
                capacity: self.capacity,
            });
        }
        self.read_stats.add(range as u32);
        Ok(())
    }

    /// Writes the queue-global async signal cell.
    pub fn send_signal(&self, signal: Signal) -> bool {
        self.async_signal.store(signal.as_raw(), Ordering::Release);
        true
    }

    /// Observes the queue-global async signal cell without consuming it.
    pub fn get_signal(&self) -> Signal {
        Signal::from_raw(self.async_signal.load(Ordering::Acquire))
    }

    /// Atomically reads and zeroes the consumer-side counters.
    pub fn take_read_stats(&self) -> Blocked {
        self.read_stats.take()
    }

    /// Atomically reads and zeroes the producer-side counters.
    pub fn take_write_stats(&self) -> Blocked {
        self.write_stats.take()
    }

    /// Whether an EOF commit has been observed. Sticky.
    pub fn write_finished(&self) -> bool {
        self.write_finished.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_fills_never_drains() {
        let q = InfiniteFifo::<u64>::new(16);
        for i in 0..1000 {
            q.push(i, Signal::None);
            assert_eq!(q.size(), 0);
            assert_eq!(q.space_avail(), 16);
        }
        for _ in 0..1000 {
            assert_eq!(q.pop(), 0, "payloads are not persisted");
        }
    }

    #[test]
    fn traffic_is_counted() {
        let q = InfiniteFifo::<u32>::new(4);
        q.insert(&[1, 2, 3], Signal::None);
        q.pop();
        q.pop_range(&mut [0u32; 5], None);
        q.recycle(2).unwrap();

        assert_eq!(q.take_write_stats().count, 3);
        assert_eq!(q.take_read_stats().count, 8);
    }

    #[test]
    fn eof_still_latches() {
        let q = InfiniteFifo::<u32>::new(4);
        q.push(1, Signal::Eof);
        assert!(q.write_finished());
    }

    #[test]
    fn async_cell_works() {
        let q = InfiniteFifo::<u32>::new(4);
        q.send_signal(Signal::Quit);
        assert_eq!(q.get_signal(), Signal::Quit);
    }

    #[test]
    fn recycle_contract_still_enforced() {
        let q = InfiniteFifo::<u32>::new(4);
        assert!(q.recycle(5).is_err());
    }
}
