//! Debug assertion macros for queue invariants.
//!
//! Active in debug builds only (`debug_assert!`), so the release data path
//! carries no overhead. Used by `Index` and the `RingFifo` operation set.

/// Assert that occupancy never exceeds capacity.
///
/// **Invariant**: `0 ≤ size ≤ capacity` at every observation.
macro_rules! debug_assert_size_bounded {
    ($size:expr, $capacity:expr) => {
        debug_assert!(
            $size <= $capacity,
            "occupancy {} exceeds capacity {}",
            $size,
            $capacity
        )
    };
}

/// Assert that a slot index stays inside the ring.
///
/// **Invariant**: `value ∈ [0, capacity)` after every increment.
macro_rules! debug_assert_index_in_range {
    ($value:expr, $capacity:expr) => {
        debug_assert!(
            $value < $capacity,
            "index value {} escaped ring of capacity {}",
            $value,
            $capacity
        )
    };
}

/// Assert that a consumer advance does not run past the producer.
///
/// **Invariant**: the consumer only advances over committed slots, so any
/// advance of `n` requires `n ≤ size` at the time of the call.
macro_rules! debug_assert_advance_within_size {
    ($n:expr, $size:expr) => {
        debug_assert!(
            $n <= $size,
            "consumer advance of {} outruns occupancy {}",
            $n,
            $size
        )
    };
}

pub(crate) use debug_assert_advance_within_size;
pub(crate) use debug_assert_index_in_range;
pub(crate) use debug_assert_size_bounded;
