//! Exponential backoff between refresh attempts after network failures.

use std::time::Duration;

/// Doubling delay with a cap.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay: Duration,
    current_delay: Duration,
    max_delay: Duration,
    failure_count: u32,
}

impl ExponentialBackoff {
    /// Default: 250ms base, 5s max.
    pub fn new() -> Self {
        Self::with_config(Duration::from_millis(250), Duration::from_secs(5))
    }

    pub fn with_config(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            current_delay: base_delay,
            max_delay,
            failure_count: 0,
        }
    }

    /// Record a failure and return the delay to wait before the next attempt.
    pub fn record_failure(&mut self) -> Duration {
        let delay = self.current_delay;
        self.failure_count += 1;
        self.current_delay = (self.current_delay * 2).min(self.max_delay);
        delay
    }

    pub fn reset(&mut self) {
        self.failure_count = 0;
        self.current_delay = self.base_delay;
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new()
    }
}
