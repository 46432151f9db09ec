//! Monotonic time as an explicit capability.
//!
//! The sampler never reaches for a global clock; whoever constructs a
//! [`Monitor`](crate::Monitor) hands it the time source. Frame arithmetic
//! works in whole seconds as `f64`, matching the resolver's percent-error
//! math.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A monotonic time source: current time in seconds since an arbitrary
/// origin, plus the smallest tick the source can resolve.
pub trait Clock: Send + Sync {
    /// Seconds since this clock's origin. Monotonic, never decreasing.
    fn now(&self) -> f64;

    /// Smallest observable time step, in seconds. Strictly positive; the
    /// frame resolver seeds its first window from this.
    fn resolution(&self) -> f64;
}

/// Wall-clock-backed implementation over [`std::time::Instant`].
///
/// The resolution is measured once at construction by watching for the
/// first observable tick, floored at one nanosecond.
pub struct SystemClock {
    origin: Instant,
    resolution: f64,
}

impl SystemClock {
    pub fn new() -> Self {
        let origin = Instant::now();
        Self {
            origin,
            resolution: Self::measure_resolution(origin),
        }
    }

    fn measure_resolution(origin: Instant) -> f64 {
        let start = origin.elapsed();
        // A few thousand iterations is orders of magnitude more than any
        // Instant backend needs to tick at least once.
        for _ in 0..10_000 {
            let delta = origin.elapsed() - start;
            if !delta.is_zero() {
                return delta.as_secs_f64().max(1e-9);
            }
        }
        1e-9
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    #[inline]
    fn resolution(&self) -> f64 {
        self.resolution
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Hand-driven clock for deterministic tests: time moves only when the
/// test advances it.
pub struct ManualClock {
    nanos: AtomicU64,
    resolution: f64,
}

impl ManualClock {
    /// Creates a clock at time zero with the given tick size in seconds.
    pub fn new(resolution: f64) -> Self {
        assert!(resolution > 0.0, "clock resolution must be positive");
        Self {
            nanos: AtomicU64::new(0),
            resolution,
        }
    }

    /// Moves time forward by `seconds`.
    pub fn advance(&self, seconds: f64) {
        assert!(seconds >= 0.0, "time cannot move backwards");
        let delta = (seconds * 1e9) as u64;
        self.nanos.fetch_add(delta, Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.nanos.load(Ordering::Acquire) as f64 * 1e-9
    }

    fn resolution(&self) -> f64 {
        self.resolution
    }
}
