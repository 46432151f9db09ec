//! Out-of-band instrumentation for `ringfifo` queues.
//!
//! A [`Monitor`] composes a background sampler over any queue exposing the
//! [`ringfifo::Probe`] surface. Once per frame the sampler reads and zeroes
//! the queue's blocked counters, classifies the frame (blocked /
//! non-converged / accepted), and accumulates arrival, departure, and
//! occupancy statistics. The frame width self-calibrates: a
//! [`FrameResolution`] doubles its window until it converges on the
//! producer/consumer cycle time, then opens an acceptance band around it.
//!
//! The sampler never mutates queue payload state; its only write access is
//! resetting the two blocked counters. Estimates therefore come for free on
//! a running queue, without perturbing the critical path.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use ringfifo::{HeapFifo, Signal};
//! use ringfifo_monitor::{Monitor, SystemClock, Units};
//!
//! let queue = Arc::new(HeapFifo::<u64>::new(1024).unwrap());
//! let monitor = Monitor::new(Arc::clone(&queue), Arc::new(SystemClock::new()));
//!
//! queue.push(7, Signal::Eof);
//! assert_eq!(queue.pop(), 7);
//!
//! let stats = monitor.finish();
//! println!("{}", stats.report(Units::MB));
//! ```

mod clock;
mod resolution;
mod sampler;
mod stats;

pub use clock::{Clock, ManualClock, SystemClock};
pub use resolution::{FrameResolution, CONVERGENCE, NUM_FRAMES};
pub use sampler::Monitor;
pub use stats::{QueueStats, RateStat, Report, Units};
