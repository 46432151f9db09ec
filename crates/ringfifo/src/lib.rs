//! RingFifo - Lock-Free Single-Producer Single-Consumer Queue
//!
//! A bounded SPSC ring buffer for moving plain-data elements between two
//! cooperating execution contexts, with three backings behind one surface:
//!
//! - [`HeapFifo`] — heap-backed, two threads of one process
//! - [`SharedFifo`] — named shared-memory segments, two processes on one
//!   host, with a liveness handshake before data moves
//! - [`InfiniteFifo`] — a never-blocking sink/source for rate calibration
//!
//! # Key Features
//!
//! - Wrap-bit index pairs (capacities need not be powers of two)
//! - Element-aligned signal delivery: a signal committed with an element is
//!   observed exactly when that element is popped
//! - Cache-aligned blocked counters the out-of-band sampler reads and
//!   zeroes without touching the critical path
//! - Adaptive spin-then-yield waits (the `nice-wait` feature yields always)
//!
//! # Example
//!
//! ```
//! use ringfifo::{HeapFifo, Signal};
//!
//! let queue = HeapFifo::<u64>::new(64).unwrap();
//!
//! // Zero-copy path: allocate, write in place, commit.
//! *queue.allocate() = 41;
//! queue.commit(Signal::None);
//!
//! // By-value path, carrying the end-of-data marker.
//! queue.push(42, Signal::Eof);
//!
//! assert_eq!(queue.pop(), 41);
//! assert_eq!(queue.pop_signaled(), (42, Signal::Eof));
//! assert!(queue.write_finished());
//! ```

mod backoff;
mod blocked;
mod error;
mod fifo;
mod index;
mod infinite;
mod invariants;
mod queue;
mod shared;
mod shm;
mod signal;
mod store;

pub use backoff::Backoff;
pub use blocked::{Blocked, BlockedCounter};
pub use error::FifoError;
pub use fifo::{Fifo, Probe};
pub use index::Index;
pub use infinite::InfiniteFifo;
pub use queue::{HeapFifo, RingFifo};
pub use shared::Direction;
pub use signal::Signal;
pub use store::{HeapStore, DEFAULT_ALIGNMENT};

#[cfg(unix)]
pub use queue::SharedFifo;
#[cfg(unix)]
pub use shm::{ShmMode, ShmSegment};
#[cfg(unix)]
pub use store::SharedStore;
