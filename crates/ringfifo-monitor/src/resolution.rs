//! Self-calibrating frame-width controller.
//!
//! The sampler wants a window "slow enough to see many items yet fast
//! enough to resolve changes". Starting from the clock's resolution, the
//! width doubles until the realized frame time lands within the percent
//! tolerance of the target, at which point an acceptance window opens
//! around the converged width. Frames in which either endpoint sat blocked
//! still feed the timing calibration but are excluded from rate
//! accumulation by the sampler.

use ringfifo::Direction;

/// Depth of the blocked-frame history ring, per direction.
pub const NUM_FRAMES: usize = 5;

/// Relative tolerance for width convergence.
pub const CONVERGENCE: f64 = 0.05;

const LOWER_PERCENT: f64 = 0.75;
const UPPER_PERCENT: f64 = 1.25;

#[derive(Debug, Clone, Copy, Default)]
struct AcceptRange {
    lower: f64,
    upper: f64,
}

/// Frame-width state for one monitored queue.
#[derive(Debug, Clone)]
pub struct FrameResolution {
    frame_blocked: [[bool; 2]; NUM_FRAMES],
    frame_index: usize,
    width: f64,
    range: AcceptRange,
    converged: bool,
}

impl FrameResolution {
    /// Creates a resolver seeded with the clock's resolution as the first
    /// candidate width.
    ///
    /// # Panics
    ///
    /// Panics if `initial_width` is not strictly positive — the width is a
    /// divisor in every rate derivation.
    pub fn new(initial_width: f64) -> Self {
        assert!(initial_width > 0.0, "frame width must be positive");
        Self {
            frame_blocked: [[false; 2]; NUM_FRAMES],
            frame_index: 0,
            width: initial_width,
            range: AcceptRange::default(),
            converged: false,
        }
    }

    /// Current frame width in seconds.
    #[inline]
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Whether the last [`update`](FrameResolution::update) found the width
    /// within tolerance.
    #[inline]
    pub fn is_converged(&self) -> bool {
        self.converged
    }

    /// Records the blocked status of `dir` for the current frame and
    /// advances the history cursor.
    pub fn set_blocked(&mut self, dir: Direction, blocked: bool) {
        let lane = match dir {
            Direction::Producer => 0,
            Direction::Consumer => 1,
        };
        self.frame_blocked[self.frame_index][lane] = blocked;
        self.frame_index = (self.frame_index + 1) % NUM_FRAMES;
    }

    /// True if either endpoint was blocked at any point in the last
    /// `NUM_FRAMES` recorded frames.
    pub fn was_blocked(&self) -> bool {
        self.frame_blocked
            .iter()
            .any(|frame| frame[0] || frame[1])
    }

    /// Folds in one realized frame time. Outside the tolerance the width
    /// doubles and the resolver reports not-converged; within it the
    /// acceptance window is (re)established.
    pub fn update(&mut self, realized_frame_time: f64) -> bool {
        let p_diff = (realized_frame_time - self.width) / self.width;
        if p_diff < -CONVERGENCE || p_diff > CONVERGENCE {
            self.width *= 2.0;
            if self.converged {
                log::debug!(
                    "frame width drifted (p_diff {p_diff:.4}); re-doubling to {:.3e}s",
                    self.width
                );
            }
            self.converged = false;
            return false;
        }
        self.range = AcceptRange {
            lower: self.width * LOWER_PERCENT,
            upper: self.width * UPPER_PERCENT,
        };
        if !self.converged {
            log::debug!("frame width converged at {:.3e}s", self.width);
        }
        self.converged = true;
        true
    }

    /// Whether a realized frame time falls inside the acceptance window.
    ///
    /// The window is `[0.75·width, 1.25·width]` and the realized time is
    /// tested directly against it. Meaningful only once converged; before
    /// that the window is empty and nothing is accepted.
    pub fn accept(&self, realized_frame_time: f64) -> bool {
        realized_frame_time >= self.range.lower && realized_frame_time <= self.range.upper
    }
}
