use std::hint;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use ringfifo::{Direction, Probe};

use crate::clock::Clock;
use crate::resolution::FrameResolution;
use crate::stats::QueueStats;

// =============================================================================
// SAMPLER DESIGN
// =============================================================================
//
// The sampler runs out-of-band: once per frame it swaps both blocked
// counters to zero, classifies the frame for each direction, and folds the
// result into the shared stats. It never touches payload state and never
// writes anything the data path reads, so removing it cannot change the
// sequence of popped values.
//
// Frame classification per direction:
//   - blocked        → recorded in the resolver's history, no accumulation
//   - not converged / outside the acceptance window
//                    → the frame "happened" but contributes nothing
//   - accepted       → items and frame count accumulate toward the rate
//
// The arrival side additionally waits for the producer's first committed
// element before classifying at all, and stops accumulating once the
// writer's EOF flag is up.
// =============================================================================

/// Background sampler composed over a queue.
///
/// Owns a clone of the queue handle and a sampler thread for the queue's
/// monitored lifetime. Dropping the monitor signals the thread, joins it,
/// and only then releases the queue reference, so the sampler can never
/// outlive the storage it reads.
pub struct Monitor<Q: Probe> {
    queue: Arc<Q>,
    shared: Arc<Mutex<QueueStats>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl<Q: Probe + 'static> Monitor<Q> {
    /// Spawns the sampler over `queue`, pacing frames with `clock`.
    pub fn new(queue: Arc<Q>, clock: Arc<dyn Clock>) -> Self {
        let resolution = FrameResolution::new(clock.resolution());
        let shared = Arc::new(Mutex::new(QueueStats::new(queue.item_bytes(), resolution)));
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let queue = Arc::clone(&queue);
            let shared = Arc::clone(&shared);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("ringfifo-sampler".into())
                .spawn(move || run(&*queue, &*clock, &shared, &stop))
                .expect("failed to spawn sampler thread")
        };

        log::debug!("sampler started");
        Self {
            queue,
            shared,
            stop,
            handle: Some(handle),
        }
    }

    /// The monitored queue.
    pub fn queue(&self) -> &Arc<Q> {
        &self.queue
    }

    /// Snapshot of the accumulated statistics. Safe at any point in the
    /// queue's life; derivations are zero-guarded.
    pub fn stats(&self) -> QueueStats {
        self.shared.lock().unwrap().clone()
    }

    /// Stops and joins the sampler, returning the final statistics.
    pub fn finish(mut self) -> QueueStats {
        self.shutdown();
        self.stats()
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            log::debug!("sampler joined");
        }
    }
}

impl<Q: Probe> Drop for Monitor<Q> {
    fn drop(&mut self) {
        // Stop the sampler before the queue reference is released.
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Busy-waits with pause hints until `deadline`, bailing early on stop.
/// Returns false when the stop flag cut the wait short.
fn wait_for_frame(clock: &dyn Clock, stop: &AtomicBool, deadline: f64) -> bool {
    while clock.now() < deadline {
        if stop.load(Ordering::Acquire) {
            return false;
        }
        hint::spin_loop();
    }
    true
}

fn run(queue: &dyn Probe, clock: &dyn Clock, shared: &Mutex<QueueStats>, stop: &AtomicBool) {
    let mut prev_time = clock.now();
    let mut arrival_started = false;
    let mut converged = false;

    while !stop.load(Ordering::Acquire) {
        let width = shared.lock().unwrap().resolution.width();
        if !wait_for_frame(clock, stop, prev_time + width) {
            break;
        }
        let now = clock.now();
        let realized = now - prev_time;

        let write_copy = queue.take_write_stats();
        let read_copy = queue.take_read_stats();

        // Hold off until the producer has actually moved; the first frame
        // with traffic only arms the arrival accounting.
        if !arrival_started {
            if write_copy.count != 0 {
                arrival_started = true;
                prev_time = now;
                thread::yield_now();
                continue;
            }
        }

        let mut data = shared.lock().unwrap();

        // Producer side: record the rate only in frames where the writer
        // ran free, had started, and had not yet signalled EOF.
        if !write_copy.blocked && arrival_started && !queue.write_finished() {
            data.resolution.set_blocked(Direction::Producer, false);
            if converged && data.resolution.accept(realized) {
                data.arrival.items += i64::from(write_copy.count);
                data.arrival.frames += 1;
            }
        } else {
            data.resolution.set_blocked(Direction::Producer, true);
        }

        // Consumer side, symmetric.
        if !read_copy.blocked {
            data.resolution.set_blocked(Direction::Consumer, false);
            if converged && data.resolution.accept(realized) {
                data.departure.items += i64::from(read_copy.count);
                data.departure.frames += 1;
            }
        } else {
            data.resolution.set_blocked(Direction::Consumer, true);
        }

        data.occupancy.items += queue.occupancy() as i64;
        data.occupancy.frames += 1;

        converged = data.resolution.update(realized);
        log::trace!(
            "frame: realized {realized:.3e}s, converged {converged}, \
             write {}+{}, read {}+{}",
            write_copy.count,
            u8::from(write_copy.blocked),
            read_copy.count,
            u8::from(read_copy.blocked)
        );
        drop(data);

        prev_time = now;
    }
}
