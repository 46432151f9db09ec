//! Error types for queue construction and contract checks.
//!
//! The blocking data path never fails: `allocate`/`pop` and friends wait,
//! and the observers (`size`, `space_avail`, `capacity`) are total. Errors
//! surface only at construction time and on explicit contract checks such as
//! [`recycle`](crate::RingFifo::recycle). End-of-data is not an error; it
//! travels in-band as [`Signal::Eof`](crate::Signal).

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by queue constructors and contract-checked operations.
#[derive(Debug, Error)]
pub enum FifoError {
    /// `recycle(range)` asked to advance past a full ring.
    #[error("recycle range {range} exceeds capacity {capacity}")]
    CapacityExceeded {
        /// The requested advance.
        range: usize,
        /// The ring capacity it must not exceed.
        capacity: usize,
    },

    /// Slot alignment is not a power-of-two multiple of the pointer size.
    #[error("alignment {0} is not a power-of-two multiple of the pointer size")]
    BadAlignment(usize),

    /// Backing allocation failed.
    #[error("allocation of {0} bytes for the slot store failed")]
    OutOfMemory(usize),

    /// A shared-memory segment could neither be created nor opened, or its
    /// contents did not match this endpoint's geometry.
    #[error("shared memory segment {name:?}: {reason}")]
    BadSharedMemory {
        /// The segment name as given to the OS.
        name: String,
        /// What went wrong with it.
        reason: String,
    },

    /// The peer endpoint did not complete the handshake in time.
    #[error("peer did not complete the handshake within {0:?}")]
    PeerNotReady(Duration),

    /// Single-producer / single-consumer usage contract violated.
    #[error("queue contract violated: {0}")]
    ContractViolation(&'static str),
}

impl FifoError {
    /// Returns `true` if retrying the same call later could succeed.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::PeerNotReady(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_offenders() {
        let err = FifoError::CapacityExceeded { range: 12, capacity: 8 };
        assert!(err.to_string().contains("12"));
        assert!(err.to_string().contains('8'));

        let err = FifoError::BadAlignment(3);
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn only_the_handshake_is_transient() {
        assert!(FifoError::PeerNotReady(Duration::from_millis(5)).is_transient());
        assert!(!FifoError::OutOfMemory(64).is_transient());
    }
}
