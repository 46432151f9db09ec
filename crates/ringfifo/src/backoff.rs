use std::hint;
use std::thread;

/// Adaptive backoff for the queue's full/empty wait loops (Crossbeam-style).
///
/// Progressively increases wait cost: spin with PAUSE hints, then yield to
/// the OS. Queue waits never give up — the contract is to block until the
/// peer makes progress — so unlike a bounded backoff there is no completion
/// state; past the spin limit every `snooze` yields.
///
/// With the `nice-wait` feature the spin phase is skipped entirely and every
/// iteration yields the scheduler.
#[derive(Debug)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 6; // 2^6 = 64 spins max before yielding

    /// Creates a new backoff instance.
    #[inline]
    pub fn new() -> Self {
        Self { step: 0 }
    }

    /// Light spin with PAUSE hints.
    #[inline]
    pub fn spin(&mut self) {
        let spins = 1 << self.step.min(Self::SPIN_LIMIT);
        for _ in 0..spins {
            hint::spin_loop();
        }
        if self.step <= Self::SPIN_LIMIT {
            self.step += 1;
        }
    }

    /// One wait iteration: spin while patience lasts, then yield.
    #[inline]
    pub fn snooze(&mut self) {
        if cfg!(feature = "nice-wait") || self.step > Self::SPIN_LIMIT {
            thread::yield_now();
        } else {
            self.spin();
        }
    }

    /// Reset for the next wait cycle.
    #[inline]
    pub fn reset(&mut self) {
        self.step = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
