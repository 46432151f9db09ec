//! Queue signal taxonomy.
//!
//! Two delivery paths exist. A *synchronous* signal rides in the signal slot
//! paired with a payload slot and is observed exactly when that element is
//! popped. An *asynchronous* signal lives in a queue-global cell that either
//! endpoint may write and either may observe at any time.

/// Per-element / queue-global signal tag.
///
/// Wire values are fixed: `None = 0`, `Eof = 1`, `Quit = 2`. No other value
/// is valid on the wire. `Eof` marks the final element of a stream; after a
/// commit carrying `Eof` the writer is finished and the queue's EOF flag
/// stays set.
#[repr(u8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Signal {
    /// No signal attached.
    #[default]
    None = 0,
    /// End of data; the producer will push nothing further.
    Eof = 1,
    /// Cooperative teardown request.
    Quit = 2,
}

impl Signal {
    /// Decodes a raw cell value, mapping anything off the wire set to `None`.
    #[inline]
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Signal::Eof,
            2 => Signal::Quit,
            _ => Signal::None,
        }
    }

    /// The wire encoding of this signal.
    #[inline]
    pub fn as_raw(self) -> u32 {
        self as u32
    }

    /// Returns `true` for the end-of-data marker.
    #[inline]
    pub fn is_eof(self) -> bool {
        matches!(self, Signal::Eof)
    }
}
