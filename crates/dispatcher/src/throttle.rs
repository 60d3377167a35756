//! Throttle policy - per-key timing decision

use std::time::{Duration, Instant};

/// Outcome of a throttle check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// The lane may execute now
    Ready,
    /// The lane must wait this long before executing
    Wait(Duration),
}

/// Minimum-interval policy shared by every lane of a dispatcher.
///
/// Pure: holds no per-key state, the caller supplies the lane's last
/// execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    interval: Duration,
}

impl ThrottlePolicy {
    /// Create a policy with the given minimum interval
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Minimum interval between two executions of one key
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Decide whether a lane last executed at `last_execution` may run at `now`.
    ///
    /// A lane that never executed is always ready.
    #[inline]
    pub fn decide(&self, now: Instant, last_execution: Option<Instant>) -> ThrottleDecision {
        let Some(last) = last_execution else {
            return ThrottleDecision::Ready;
        };
        let elapsed = now.saturating_duration_since(last);
        if elapsed >= self.interval {
            ThrottleDecision::Ready
        } else {
            ThrottleDecision::Wait(self.interval - elapsed)
        }
    }
}
