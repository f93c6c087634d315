//! # Countdown Latch
//!
//! One-shot gate built on the monitor: waiters block until the count
//! reaches zero. The agent's `await` path blocks on a single-count latch
//! that its injected synchronization job trips.

use crate::monitor::Monitor;
use std::time::Duration;

pub struct CountDownLatch {
    count: Monitor<usize>,
}

impl CountDownLatch {
    pub fn new(count: usize) -> Self {
        Self { count: Monitor::new(count) }
    }

    pub fn count(&self) -> usize {
        self.count.enter(|s| **s)
    }

    /// Decrement the count, saturating at zero; wakes all waiters when
    /// zero is reached.
    pub fn count_down(&self) {
        self.count.enter(|s| {
            if **s > 0 {
                **s -= 1;
                if **s == 0 {
                    s.broadcast();
                }
            }
        });
    }

    /// Block until the count reaches zero or `timeout` elapses. Returns
    /// whether zero was reached.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        self.count.enter(|s| s.wait_until(timeout, |count| *count == 0))
    }
}
