//! Move-time budget for a blocked `choose_move` call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Thread-safe time controller that tracks whether the caller should stop waiting.
///
/// Cheap to clone; clones share the stop flag and the clock.
#[derive(Debug, Clone)]
pub struct TimeControl {
    /// Shared stop flag
    stopped: Arc<AtomicBool>,
    /// Start time of the current wait
    start_time: Arc<RwLock<Option<Instant>>>,
    /// Time limit (None = wait until the depth target is met)
    time_limit: Option<Duration>,
}

impl TimeControl {
    pub fn new(time_limit: Option<Duration>) -> Self {
        Self {
            stopped: Arc::new(AtomicBool::new(false)),
            start_time: Arc::new(RwLock::new(None)),
            time_limit,
        }
    }

    /// Replace the limit used by later checks.
    pub fn set_limit(&mut self, time_limit: Option<Duration>) {
        self.time_limit = time_limit;
    }

    /// Start the clock.
    pub fn start(&self) {
        *self.start_time.write() = Some(Instant::now());
        self.stopped.store(false, Ordering::SeqCst);
    }

    /// Force stop immediately.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Check the clock and set the stop flag once the limit has passed.
    pub fn check_time(&self) -> bool {
        if self.is_stopped() {
            return true;
        }

        if let Some(limit) = self.time_limit {
            if let Some(start) = *self.start_time.read() {
                if start.elapsed() >= limit {
                    self.stop();
                    return true;
                }
            }
        }

        false
    }

    /// Elapsed time since `start`.
    pub fn elapsed(&self) -> Duration {
        let start = *self.start_time.read();
        start.map(|s| s.elapsed()).unwrap_or(Duration::ZERO)
    }

    /// Remaining time (None if there is no limit).
    pub fn remaining(&self) -> Option<Duration> {
        let limit = self.time_limit?;
        Some(limit.saturating_sub(self.elapsed()))
    }

    /// How long to block before looking again: the poll interval, cut short by the deadline.
    pub fn next_wait(&self, poll: Duration) -> Duration {
        match self.remaining() {
            Some(left) => left.min(poll),
            None => poll,
        }
    }
}

impl Default for TimeControl {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
#[path = "time_control_tests.rs"]
mod time_control_tests;
