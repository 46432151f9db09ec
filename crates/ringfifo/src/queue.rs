use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_utils::CachePadded;

use crate::backoff::Backoff;
use crate::blocked::{Blocked, BlockedCounter};
use crate::error::FifoError;
use crate::invariants::{debug_assert_advance_within_size, debug_assert_size_bounded};
use crate::signal::Signal;
use crate::store::{HeapStore, Store, DEFAULT_ALIGNMENT};

#[cfg(unix)]
use crate::shared::Direction;
#[cfg(unix)]
use crate::store::SharedStore;
#[cfg(unix)]
use std::time::Duration;

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// This SPSC ring buffer follows the classic producer-consumer protocol, with
// positions carried as (value, wrap-bit) pairs rather than unbounded
// sequence numbers so that capacities need not be powers of two and the
// index cells can live in a shared-memory mapping.
//
// ## Ordering protocol
//
// **Producer (write path):**
// 1. Load write_pt with Relaxed (only the producer mutates it)
// 2. Load read_pt with Acquire (synchronizes with the consumer's advance)
// 3. Write the payload slot and its paired signal slot (plain writes,
//    protected by the protocol)
// 4. Advance write_pt with a Release store (publishes both writes)
//
// **Consumer (read path):**
// 1. Load read_pt with Relaxed (only the consumer mutates it)
// 2. Load write_pt with Acquire (synchronizes with the producer's advance)
// 3. Read the payload slot and its signal slot
// 4. Advance read_pt with a Release store (frees the slot for reuse)
//
// ## Single-writer invariants
//
// - write_pt: written only by the producer
// - read_pt: written only by the consumer
// - slot[i] / signal[i]: written by the producer while i is between the two
//   positions on its side, read by the consumer on the other side; never
//   both at once, by the occupancy arithmetic
// - write_stats / read_stats: written by their owning endpoint, swapped to
//   zero by the sampler (tolerated tear, see BlockedCounter)
// - allocate_called: producer-local latch, Relaxed is sufficient
//
// Exactly one producer and one consumer per queue instance is a usage
// contract, not something the type system enforces across processes.
// =============================================================================

/// Lock-free single-producer / single-consumer ring buffer.
///
/// Generic over its backing [`Store`]: [`HeapFifo`] shares the queue between
/// two threads of one process, [`SharedFifo`] between two processes via
/// named shared-memory segments. Elements are plain data (`T: Copy`) and
/// move through the queue by copy.
///
/// Every payload slot has a paired signal slot; a signal committed with an
/// element is observed exactly when that element is popped. A separate
/// queue-global cell carries one out-of-band signal writable by either
/// endpoint at any time.
pub struct RingFifo<T: Copy, S: Store<T>> {
    store: S,
    read_stats: CachePadded<BlockedCounter>,
    write_stats: CachePadded<BlockedCounter>,
    /// Producer-local latch: an `allocate` has handed out the slot at
    /// `write_pt` and no `commit` has released it yet.
    allocate_called: AtomicBool,
    _marker: PhantomData<T>,
}

// Safety: the store hands out raw pointers into storage governed by the
// ordering protocol above; the queue is shared by reference between the
// producer, consumer, and sampler contexts.
unsafe impl<T: Copy + Send, S: Store<T>> Send for RingFifo<T, S> {}
unsafe impl<T: Copy + Send, S: Store<T>> Sync for RingFifo<T, S> {}

/// Heap-backed queue for two threads of one process.
pub type HeapFifo<T> = RingFifo<T, HeapStore<T>>;

/// Shared-memory-backed queue for two processes on one host.
#[cfg(unix)]
pub type SharedFifo<T> = RingFifo<T, SharedStore<T>>;

impl<T: Copy> HeapFifo<T> {
    /// Creates a heap-backed queue of `capacity` slots with the default
    /// slot alignment.
    pub fn new(capacity: usize) -> Result<Self, FifoError> {
        Self::with_alignment(capacity, DEFAULT_ALIGNMENT)
    }

    /// Creates a heap-backed queue with caller-chosen slot alignment
    /// (a power-of-two multiple of the pointer size).
    pub fn with_alignment(capacity: usize, align: usize) -> Result<Self, FifoError> {
        Ok(Self::from_store(HeapStore::new(capacity, align)?))
    }
}

#[cfg(unix)]
impl<T: Copy> SharedFifo<T> {
    /// Creates or attaches one endpoint of a shared-memory queue. Both
    /// endpoints pass the same `key` and `capacity`; whichever arrives
    /// first creates the segments.
    pub fn new(capacity: usize, key: &str, direction: Direction) -> Result<Self, FifoError> {
        Self::with_alignment(capacity, key, direction, DEFAULT_ALIGNMENT)
    }

    /// As [`new`](SharedFifo::new), with caller-chosen slot alignment.
    pub fn with_alignment(
        capacity: usize,
        key: &str,
        direction: Direction,
        align: usize,
    ) -> Result<Self, FifoError> {
        Ok(Self::from_store(SharedStore::new(capacity, key, direction, align)?))
    }

    /// This endpoint's role.
    pub fn direction(&self) -> Direction {
        self.store.direction()
    }

    /// Waits up to `grace` for the peer endpoint to attach and announce
    /// itself; [`FifoError::PeerNotReady`] past the deadline.
    ///
    /// The data operations perform the same wait cooperatively and
    /// unboundedly; call this first when a bounded liveness check is
    /// wanted.
    pub fn wait_for_peer(&self, grace: Duration) -> Result<(), FifoError> {
        self.store.wait_for_peer(grace)
    }
}

impl<T: Copy, S: Store<T>> RingFifo<T, S> {
    fn from_store(store: S) -> Self {
        Self {
            store,
            read_stats: CachePadded::new(BlockedCounter::new()),
            write_stats: CachePadded::new(BlockedCounter::new()),
            allocate_called: AtomicBool::new(false),
            _marker: PhantomData,
        }
    }

    // ---------------------------------------------------------------------
    // OBSERVERS
    // ---------------------------------------------------------------------

    /// Number of committed elements currently in the queue.
    ///
    /// Exact for the endpoint that owns the matching index; a lower bound
    /// (consumer) or upper bound (producer) for the peer, which is exactly
    /// the conservative direction each side needs.
    pub fn size(&self) -> usize {
        let hdr = self.store.header();
        let (wv, ww) = hdr.write_pt().snapshot();
        let (rv, rw) = hdr.read_pt().snapshot();
        let capacity = self.store.capacity();

        let size = if wv == rv {
            // Same slot value: wrap parity is what separates empty from full.
            if ww == rw {
                0
            } else {
                capacity
            }
        } else if rv < wv {
            wv - rv
        } else {
            capacity - rv + wv
        };
        debug_assert_size_bounded!(size, capacity);
        size
    }

    /// Free slots remaining; always `capacity − size`.
    #[inline]
    pub fn space_avail(&self) -> usize {
        self.store.capacity() - self.size()
    }

    /// Fixed slot count of this queue.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Returns a writable reference to the slot at the write position,
    /// blocking while the queue is full. Must be released with
    /// [`commit`](RingFifo::commit) before the next `allocate`.
    ///
    /// On entering the wait the writer's blocked flag is raised for the
    /// sampler to observe.
    ///
    /// Single-producer contract: exactly one thread drives the write side;
    /// holding two `allocate` references at once violates the contract (the
    /// second call returns the same slot).
    pub fn allocate(&self) -> &mut T {
        self.store.ensure_peer();
        if self.space_avail() == 0 {
            self.write_stats.set_blocked();
            let mut backoff = Backoff::new();
            while self.space_avail() == 0 {
                backoff.snooze();
            }
        }
        self.allocate_called.store(true, Ordering::Relaxed);
        let idx = self.store.header().write_pt().value();
        // SAFETY: the slot at write_pt is outside [read_pt, write_pt), so
        // the consumer does not touch it; the single-producer contract
        // makes this the only live mutable reference.
        unsafe { &mut *self.store.slot_ptr(idx) }
    }

    /// Releases the slot handed out by [`allocate`](RingFifo::allocate),
    /// pairing it with `signal`. Silently returns when no allocation is
    /// outstanding.
    ///
    /// [`Signal::Eof`] latches the queue's sticky writer-finished flag.
    pub fn commit(&self, signal: Signal) {
        if !self.allocate_called.swap(false, Ordering::Relaxed) {
            return;
        }
        let hdr = self.store.header();
        let idx = hdr.write_pt().value();
        // SAFETY: same slot ownership argument as allocate; the paired
        // signal slot is co-indexed.
        unsafe { *self.store.signal_ptr(idx) = signal };
        if signal.is_eof() {
            hdr.set_write_finished();
        }
        // Release store: publishes the payload and signal writes above.
        hdr.write_pt().inc();
        self.write_stats.add(1);
    }

    /// Copies `item` into the queue with its paired `signal`, blocking
    /// while full. Equivalent to `allocate`, assign, `commit`.
    pub fn push(&self, item: T, signal: Signal) {
        *self.allocate() = item;
        self.commit(signal);
    }

    /// Writes `items` in order, blocking for space per element. Only the
    /// final element carries `signal`; its predecessors carry
    /// [`Signal::None`].
    pub fn insert(&self, items: &[T], signal: Signal) {
        let Some((last, rest)) = items.split_last() else {
            return;
        };
        for &item in rest {
            self.push(item, Signal::None);
        }
        self.push(*last, signal);
    }

    // ---------------------------------------------------------------------
    // CONSUMER API
    // ---------------------------------------------------------------------

    fn wait_for_items(&self, n: usize) {
        if self.size() < n {
            self.read_stats.set_blocked();
            let mut backoff = Backoff::new();
            while self.size() < n {
                backoff.snooze();
            }
        }
    }

    /// Pops the head element together with its paired signal, blocking
    /// while the queue is empty.
    pub fn pop_signaled(&self) -> (T, Signal) {
        self.store.ensure_peer();
        self.wait_for_items(1);

        let hdr = self.store.header();
        let idx = hdr.read_pt().value();
        // SAFETY: size ≥ 1, so the slot at read_pt was committed by the
        // producer and published by its release advance; the single-consumer
        // contract makes us the only reader.
        let item = unsafe { ptr::read(self.store.slot_ptr(idx)) };
        let signal = unsafe { ptr::read(self.store.signal_ptr(idx)) };
        // Release store: returns the slot to the producer.
        hdr.read_pt().inc();
        self.read_stats.add(1);
        (item, signal)
    }

    /// Pops the head element, discarding its signal.
    #[inline]
    pub fn pop(&self) -> T {
        self.pop_signaled().0
    }

    /// Pops `out.len()` consecutive elements, blocking until that many are
    /// committed. When `signals` is given it must be the same length and
    /// receives the paired signals. Empty `out` is a no-op.
    pub fn pop_range(&self, out: &mut [T], mut signals: Option<&mut [Signal]>) {
        let n = out.len();
        if n == 0 {
            return;
        }
        assert!(
            n <= self.store.capacity(),
            "a range of {n} can never fit a ring of {}",
            self.store.capacity()
        );
        if let Some(sigs) = signals.as_deref() {
            assert_eq!(sigs.len(), n, "signal buffer length must match item buffer length");
        }
        self.store.ensure_peer();
        self.wait_for_items(n);

        let hdr = self.store.header();
        let capacity = self.store.capacity();
        let mut idx = hdr.read_pt().value();
        for i in 0..n {
            // SAFETY: all n slots are committed (size ≥ n) and unread.
            out[i] = unsafe { ptr::read(self.store.slot_ptr(idx)) };
            if let Some(sigs) = signals.as_deref_mut() {
                sigs[i] = unsafe { ptr::read(self.store.signal_ptr(idx)) };
            }
            idx += 1;
            if idx == capacity {
                idx = 0;
            }
        }
        // Single release advance covers the whole range.
        hdr.read_pt().inc_by(n);
        self.read_stats.add(n as u32);
    }

    /// Borrows the head element without advancing, blocking while empty.
    /// Pair with [`recycle`](RingFifo::recycle) to discard in place.
    pub fn peek(&self) -> &T {
        self.peek_signaled().0
    }

    /// As [`peek`](RingFifo::peek), also returning the paired signal.
    pub fn peek_signaled(&self) -> (&T, Signal) {
        self.store.ensure_peer();
        self.wait_for_items(1);
        let idx = self.store.header().read_pt().value();
        // SAFETY: head slot is committed and stays valid until this
        // consumer advances past it; no advance happens here.
        let item = unsafe { &*self.store.slot_ptr(idx) };
        let signal = unsafe { ptr::read(self.store.signal_ptr(idx)) };
        (item, signal)
    }

    /// Discards `range` elements already consumed in place via
    /// [`peek`](RingFifo::peek), advancing the read position without
    /// copying. `range` beyond the ring capacity is a contract violation.
    pub fn recycle(&self, range: usize) -> Result<(), FifoError> {
        let capacity = self.store.capacity();
        if range > capacity {
            return Err(FifoError::CapacityExceeded { range, capacity });
        }
        if range == 0 {
            return Ok(());
        }
        debug_assert_advance_within_size!(range, self.size());
        self.store.header().read_pt().inc_by(range);
        self.read_stats.add(range as u32);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // ASYNC SIGNALS
    // ---------------------------------------------------------------------

    /// Writes the queue-global async signal cell. Either endpoint may send;
    /// a later send overwrites an unobserved one.
    pub fn send_signal(&self, signal: Signal) -> bool {
        self.store.header().send_signal(signal);
        true
    }

    /// Observes the queue-global async signal cell without consuming it.
    pub fn get_signal(&self) -> Signal {
        self.store.header().get_signal()
    }

    // ---------------------------------------------------------------------
    // SAMPLER PROBES
    // ---------------------------------------------------------------------

    /// Atomically reads and zeroes the consumer-side counters.
    /// Sampler-only.
    pub fn take_read_stats(&self) -> Blocked {
        self.read_stats.take()
    }

    /// Atomically reads and zeroes the producer-side counters.
    /// Sampler-only.
    pub fn take_write_stats(&self) -> Blocked {
        self.write_stats.take()
    }

    /// Whether a [`Signal::Eof`] commit has latched the writer-finished
    /// flag. Sticky once set.
    pub fn write_finished(&self) -> bool {
        self.store.header().write_finished()
    }
}

impl<T: Copy, S: Store<T>> std::fmt::Debug for RingFifo<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingFifo")
            .field("capacity", &self.capacity())
            .field("size", &self.size())
            .field("write_finished", &self.write_finished())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_roundtrip() {
        let q = HeapFifo::<u64>::new(8).unwrap();
        q.push(11, Signal::None);
        q.push(22, Signal::None);
        assert_eq!(q.size(), 2);
        assert_eq!(q.pop(), 11);
        assert_eq!(q.pop(), 22);
        assert_eq!(q.size(), 0);
    }

    #[test]
    fn allocate_then_commit_moves_the_write_index() {
        let q = HeapFifo::<u32>::new(4).unwrap();
        *q.allocate() = 7;
        assert_eq!(q.size(), 0, "uncommitted slot is not visible");
        q.commit(Signal::None);
        assert_eq!(q.size(), 1);
        assert_eq!(q.pop(), 7);
    }

    #[test]
    fn commit_without_allocate_is_silent() {
        let q = HeapFifo::<u32>::new(4).unwrap();
        q.commit(Signal::None);
        assert_eq!(q.size(), 0);
    }

    #[test]
    fn full_at_exactly_capacity() {
        let q = HeapFifo::<u32>::new(3).unwrap();
        for i in 0..3 {
            q.push(i, Signal::None);
        }
        assert_eq!(q.size(), 3);
        assert_eq!(q.space_avail(), 0);
        // Drain from the full (wrap-disambiguated) state.
        for i in 0..3 {
            assert_eq!(q.pop(), i);
        }
        assert_eq!(q.size(), 0);
        assert_eq!(q.space_avail(), 3);
    }

    #[test]
    fn complementarity_holds_across_operations() {
        let q = HeapFifo::<u8>::new(5).unwrap();
        for round in 0..3u8 {
            for i in 0..4 {
                q.push(round * 4 + i, Signal::None);
                assert_eq!(q.size() + q.space_avail(), q.capacity());
            }
            for _ in 0..4 {
                q.pop();
                assert_eq!(q.size() + q.space_avail(), q.capacity());
            }
        }
    }

    #[test]
    fn signal_rides_with_its_element() {
        let q = HeapFifo::<u32>::new(4).unwrap();
        q.push(1, Signal::None);
        q.push(2, Signal::Quit);
        q.push(3, Signal::Eof);
        assert_eq!(q.pop_signaled(), (1, Signal::None));
        assert_eq!(q.pop_signaled(), (2, Signal::Quit));
        assert_eq!(q.pop_signaled(), (3, Signal::Eof));
    }

    #[test]
    fn eof_commit_latches_write_finished() {
        let q = HeapFifo::<u32>::new(4).unwrap();
        assert!(!q.write_finished());
        q.push(1, Signal::Eof);
        assert!(q.write_finished());
        q.pop();
        assert!(q.write_finished(), "flag is sticky");
    }

    #[test]
    fn insert_attaches_signal_to_last_element_only() {
        let q = HeapFifo::<u32>::new(8).unwrap();
        q.insert(&[1, 2, 3], Signal::Eof);
        assert_eq!(q.pop_signaled(), (1, Signal::None));
        assert_eq!(q.pop_signaled(), (2, Signal::None));
        assert_eq!(q.pop_signaled(), (3, Signal::Eof));
    }

    #[test]
    fn pop_range_preserves_order_and_signals() {
        let q = HeapFifo::<u32>::new(8).unwrap();
        q.insert(&[10, 20, 30, 40], Signal::Eof);

        let mut items = [0u32; 4];
        let mut sigs = [Signal::Quit; 4];
        q.pop_range(&mut items, Some(&mut sigs));
        assert_eq!(items, [10, 20, 30, 40]);
        assert_eq!(sigs, [Signal::None, Signal::None, Signal::None, Signal::Eof]);
        assert_eq!(q.size(), 0);
    }

    #[test]
    fn pop_range_with_empty_buffer_is_a_noop() {
        let q = HeapFifo::<u32>::new(4).unwrap();
        q.push(5, Signal::None);
        q.pop_range(&mut [], None);
        assert_eq!(q.size(), 1);
    }

    #[test]
    fn peek_then_recycle_drains_in_place() {
        let q = HeapFifo::<u32>::new(16).unwrap();
        q.insert(&[1, 2, 3], Signal::None);

        assert_eq!(*q.peek(), 1);
        assert_eq!(*q.peek(), 1, "peek does not advance");
        q.recycle(1).unwrap();
        assert_eq!(*q.peek(), 2);
        q.recycle(1).unwrap();
        assert_eq!(*q.peek(), 3);
        q.recycle(1).unwrap();
        assert_eq!(q.size(), 0);
    }

    #[test]
    fn recycle_past_capacity_is_rejected() {
        let q = HeapFifo::<u32>::new(4).unwrap();
        let err = q.recycle(5).unwrap_err();
        assert!(matches!(
            err,
            FifoError::CapacityExceeded { range: 5, capacity: 4 }
        ));
    }

    #[test]
    fn async_signal_is_observable_by_either_side() {
        let q = HeapFifo::<u32>::new(4).unwrap();
        assert_eq!(q.get_signal(), Signal::None);
        assert!(q.send_signal(Signal::Quit));
        assert_eq!(q.get_signal(), Signal::Quit);
        assert_eq!(q.get_signal(), Signal::Quit, "observation does not consume");
    }

    #[test]
    fn counters_track_traffic_and_reset() {
        let q = HeapFifo::<u32>::new(4).unwrap();
        q.push(1, Signal::None);
        q.push(2, Signal::None);
        q.pop();

        assert_eq!(q.take_write_stats(), Blocked { count: 2, blocked: false });
        assert_eq!(q.take_read_stats(), Blocked { count: 1, blocked: false });
        assert_eq!(q.take_write_stats(), Blocked::default());
    }

    #[test]
    fn wrap_bit_distinguishes_full_from_empty_across_traversals() {
        let q = HeapFifo::<u32>::new(2).unwrap();
        for round in 0..5 {
            q.push(round, Signal::None);
            q.push(round + 100, Signal::None);
            assert_eq!(q.size(), 2, "full after {round} traversals");
            assert_eq!(q.pop(), round);
            assert_eq!(q.pop(), round + 100);
            assert_eq!(q.size(), 0, "empty after {round} traversals");
        }
    }
}
