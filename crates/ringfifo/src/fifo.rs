//! The deployment-independent queue surface.
//!
//! Constructors return concrete queue types; this trait is the single
//! operation set they all expose, so code that drives a queue can stay
//! generic over where the queue's storage lives. The companion [`Probe`]
//! trait is the narrow, read-and-reset view the instrumentation sampler
//! uses — it deliberately exposes no data-path operations.

use std::mem;

use crate::blocked::Blocked;
use crate::error::FifoError;
use crate::infinite::InfiniteFifo;
use crate::queue::RingFifo;
use crate::signal::Signal;
use crate::store::Store;

/// The SPSC queue operation set (one writer, one reader, per instance).
pub trait Fifo<T: Copy> {
    /// Writable reference to the slot at the write position; blocks while
    /// full. Must be released with [`commit`](Fifo::commit).
    fn allocate(&self) -> &mut T;

    /// Releases the allocated slot with its paired signal; silently returns
    /// when no allocation is outstanding.
    fn commit(&self, signal: Signal);

    /// Copies `item` in with its paired `signal`, blocking while full.
    fn push(&self, item: T, signal: Signal);

    /// Writes `items` in order; only the last element carries `signal`.
    fn insert(&self, items: &[T], signal: Signal);

    /// Pops the head element, blocking while empty.
    fn pop(&self) -> T;

    /// Pops the head element with its paired signal, blocking while empty.
    fn pop_signaled(&self) -> (T, Signal);

    /// Pops `out.len()` consecutive elements, blocking until available.
    fn pop_range(&self, out: &mut [T], signals: Option<&mut [Signal]>);

    /// Borrows the head element without advancing, blocking while empty.
    fn peek(&self) -> &T;

    /// As [`peek`](Fifo::peek), also returning the paired signal.
    fn peek_signaled(&self) -> (&T, Signal);

    /// Advances the read position over elements consumed in place.
    fn recycle(&self, range: usize) -> Result<(), FifoError>;

    /// Writes the queue-global async signal cell.
    fn send_signal(&self, signal: Signal) -> bool;

    /// Observes the queue-global async signal cell.
    fn get_signal(&self) -> Signal;

    /// Committed elements currently queued.
    fn size(&self) -> usize;

    /// Free slots remaining.
    fn space_avail(&self) -> usize;

    /// Fixed slot count.
    fn capacity(&self) -> usize;
}

impl<T: Copy, S: Store<T>> Fifo<T> for RingFifo<T, S> {
    fn allocate(&self) -> &mut T {
        RingFifo::allocate(self)
    }

    fn commit(&self, signal: Signal) {
        RingFifo::commit(self, signal);
    }

    fn push(&self, item: T, signal: Signal) {
        RingFifo::push(self, item, signal);
    }

    fn insert(&self, items: &[T], signal: Signal) {
        RingFifo::insert(self, items, signal);
    }

    fn pop(&self) -> T {
        RingFifo::pop(self)
    }

    fn pop_signaled(&self) -> (T, Signal) {
        RingFifo::pop_signaled(self)
    }

    fn pop_range(&self, out: &mut [T], signals: Option<&mut [Signal]>) {
        RingFifo::pop_range(self, out, signals);
    }

    fn peek(&self) -> &T {
        RingFifo::peek(self)
    }

    fn peek_signaled(&self) -> (&T, Signal) {
        RingFifo::peek_signaled(self)
    }

    fn recycle(&self, range: usize) -> Result<(), FifoError> {
        RingFifo::recycle(self, range)
    }

    fn send_signal(&self, signal: Signal) -> bool {
        RingFifo::send_signal(self, signal)
    }

    fn get_signal(&self) -> Signal {
        RingFifo::get_signal(self)
    }

    fn size(&self) -> usize {
        RingFifo::size(self)
    }

    fn space_avail(&self) -> usize {
        RingFifo::space_avail(self)
    }

    fn capacity(&self) -> usize {
        RingFifo::capacity(self)
    }
}

impl<T: Copy> Fifo<T> for InfiniteFifo<T> {
    fn allocate(&self) -> &mut T {
        InfiniteFifo::allocate(self)
    }

    fn commit(&self, signal: Signal) {
        InfiniteFifo::commit(self, signal);
    }

    fn push(&self, item: T, signal: Signal) {
        InfiniteFifo::push(self, item, signal);
    }

    fn insert(&self, items: &[T], signal: Signal) {
        InfiniteFifo::insert(self, items, signal);
    }

    fn pop(&self) -> T {
        InfiniteFifo::pop(self)
    }

    fn pop_signaled(&self) -> (T, Signal) {
        InfiniteFifo::pop_signaled(self)
    }

    fn pop_range(&self, out: &mut [T], signals: Option<&mut [Signal]>) {
        InfiniteFifo::pop_range(self, out, signals);
    }

    fn peek(&self) -> &T {
        InfiniteFifo::peek(self)
    }

    fn peek_signaled(&self) -> (&T, Signal) {
        InfiniteFifo::peek_signaled(self)
    }

    fn recycle(&self, range: usize) -> Result<(), FifoError> {
        InfiniteFifo::recycle(self, range)
    }

    fn send_signal(&self, signal: Signal) -> bool {
        InfiniteFifo::send_signal(self, signal)
    }

    fn get_signal(&self) -> Signal {
        InfiniteFifo::get_signal(self)
    }

    fn size(&self) -> usize {
        InfiniteFifo::size(self)
    }

    fn space_avail(&self) -> usize {
        InfiniteFifo::space_avail(self)
    }

    fn capacity(&self) -> usize {
        InfiniteFifo::capacity(self)
    }
}

/// Sampler-facing view of a queue: the read-and-reset counters plus the
/// observers the monitor loop needs. No data-path access.
pub trait Probe: Send + Sync {
    /// Atomically reads and zeroes the consumer-side counters.
    fn take_read_stats(&self) -> Blocked;

    /// Atomically reads and zeroes the producer-side counters.
    fn take_write_stats(&self) -> Blocked;

    /// Whether the writer has committed an EOF.
    fn write_finished(&self) -> bool;

    /// Current occupancy.
    fn occupancy(&self) -> usize;

    /// Size in bytes of one queued element.
    fn item_bytes(&self) -> usize;
}

impl<T: Copy + Send, S: Store<T>> Probe for RingFifo<T, S> {
    fn take_read_stats(&self) -> Blocked {
        RingFifo::take_read_stats(self)
    }

    fn take_write_stats(&self) -> Blocked {
        RingFifo::take_write_stats(self)
    }

    fn write_finished(&self) -> bool {
        RingFifo::write_finished(self)
    }

    fn occupancy(&self) -> usize {
        self.size()
    }

    fn item_bytes(&self) -> usize {
        mem::size_of::<T>()
    }
}

impl<T: Copy + Send> Probe for InfiniteFifo<T> {
    fn take_read_stats(&self) -> Blocked {
        InfiniteFifo::take_read_stats(self)
    }

    fn take_write_stats(&self) -> Blocked {
        InfiniteFifo::take_write_stats(self)
    }

    fn write_finished(&self) -> bool {
        InfiniteFifo::write_finished(self)
    }

    fn occupancy(&self) -> usize {
        0
    }

    fn item_bytes(&self) -> usize {
        mem::size_of::<T>()
    }
}
