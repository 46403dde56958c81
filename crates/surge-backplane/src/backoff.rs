//! Capped exponential backoff for reconnection loops.

use std::time::Duration;

/// Exponential backoff: base delay doubling per attempt, capped.
///
/// Reconnection never gives up; the caller loops forever and resets the
/// backoff after a successful connect.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempt: 0,
        }
    }

    /// The delay to wait before the next attempt, advancing the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self
            .base
            .saturating_mul(1u32 << self.attempt.min(16))
            .min(self.cap);
        if delay < self.cap {
            self.attempt += 1;
        }
        delay
    }

    /// Reset after a successful connect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
