//! Restart bookkeeping for one (supervisor, child) edge.
//!
//! The window opens at the first counted failure and closes `within` later.
//! Once it has closed, the next failure starts a new window with a count of
//! zero. A failure that pushes the count above `max_restarts` escalates.

use std::time::Duration;

use tokio::time::Instant;

/// What to do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartVerdict {
    /// Restart the child; `attempt` is the count within the window.
    Restart { attempt: u32 },
    /// The budget is spent.
    Escalate { failures: u32 },
}

/// Sliding restart window for a single child.
#[derive(Debug, Clone)]
pub struct RestartTracker {
    max_restarts: u32,
    within: Duration,
    window_start: Option<Instant>,
    count: u32,
    total: u64,
}

impl RestartTracker {
    #[must_use]
    pub const fn new(max_restarts: u32, within: Duration) -> Self {
        Self {
            max_restarts,
            within,
            window_start: None,
            count: 0,
            total: 0,
        }
    }

    fn expire(&mut self, now: Instant) {
        if let Some(start) = self.window_start {
            if now.saturating_duration_since(start) >= self.within {
                self.window_start = None;
                self.count = 0;
            }
        }
    }

    /// Count a failure observed at `now`.
    pub fn record_failure(&mut self, now: Instant) -> RestartVerdict {
        self.expire(now);
        if self.window_start.is_none() {
            self.window_start = Some(now);
        }
        self.count = self.count.saturating_add(1);
        if self.count > self.max_restarts {
            RestartVerdict::Escalate {
                failures: self.count,
            }
        } else {
            self.total = self.total.saturating_add(1);
            RestartVerdict::Restart {
                attempt: self.count,
            }
        }
    }

    /// Failures counted in the window still open at `now`.
    #[must_use]
    pub fn restarts_in_window(&self, now: Instant) -> u32 {
        match self.window_start {
            Some(start) if now.saturating_duration_since(start) < self.within => self.count,
            _ => 0,
        }
    }

    /// Restarts granted over the tracker's lifetime.
    #[must_use]
    pub const fn total_restarts(&self) -> u64 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn should_escalate_on_the_failure_after_max_restarts() {
        let mut tracker = RestartTracker::new(3, WINDOW);
        let t0 = Instant::now();

        for attempt in 1..=3 {
            let at = t0 + Duration::from_secs(u64::from(attempt));
            assert_eq!(
                tracker.record_failure(at),
                RestartVerdict::Restart { attempt }
            );
        }
        assert_eq!(
            tracker.record_failure(t0 + Duration::from_secs(10)),
            RestartVerdict::Escalate { failures: 4 }
        );
        assert_eq!(tracker.total_restarts(), 3);
    }

    #[test]
    fn should_reset_once_window_elapsed_since_first_failure() {
        let mut tracker = RestartTracker::new(2, WINDOW);
        let t0 = Instant::now();

        tracker.record_failure(t0);
        tracker.record_failure(t0 + Duration::from_secs(30));
        assert_eq!(tracker.restarts_in_window(t0 + Duration::from_secs(59)), 2);
        assert_eq!(tracker.restarts_in_window(t0 + WINDOW), 0);

        // Window measured from the first failure, not the latest one.
        assert_eq!(
            tracker.record_failure(t0 + WINDOW),
            RestartVerdict::Restart { attempt: 1 }
        );
    }

    #[test]
    fn should_escalate_immediately_with_zero_budget() {
        let mut tracker = RestartTracker::new(0, WINDOW);
        assert_eq!(
            tracker.record_failure(Instant::now()),
            RestartVerdict::Escalate { failures: 1 }
        );
    }
}
