//! Backoff schedule per failure class.

use crate::error_code::FailureClass;
use rand::Rng;
use std::time::Duration;

/// Exponential backoff: `base * 2^attempt`, capped at `max`.
pub fn exponential_backoff(base: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(max)
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Base of the exponential schedule for server errors and 429s.
    pub base_delay: Duration,
    /// Upper bound for every delay, hints included.
    pub max_delay: Duration,
    /// Fixed delay after a refused/reset connection.
    pub connection_delay: Duration,
    /// Step of the linear schedule after a timeout.
    pub timeout_delay: Duration,
    /// Relative jitter applied to the exponential schedule (0.2 = +/-20%).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            connection_delay: Duration::from_millis(100),
            timeout_delay: Duration::from_millis(500),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_connection_delay(mut self, delay: Duration) -> Self {
        self.connection_delay = delay;
        self
    }

    pub fn with_timeout_delay(mut self, delay: Duration) -> Self {
        self.timeout_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before retrying after `attempt` (0-based) failed with `class`.
    ///
    /// `None` means the failure is not worth retrying. A provider `hint`
    /// replaces the computed delay, still capped at `max_delay`.
    pub fn delay_for(
        &self,
        class: FailureClass,
        attempt: u32,
        hint: Option<Duration>,
    ) -> Option<Duration> {
        if !class.retryable() {
            return None;
        }
        if let Some(hint) = hint {
            return Some(hint.min(self.max_delay));
        }
        let delay = match class {
            FailureClass::Connection => self.connection_delay,
            FailureClass::Timeout => self.timeout_delay.saturating_mul(attempt.saturating_add(1)),
            _ => self.jittered(exponential_backoff(
                self.base_delay,
                self.max_delay,
                attempt,
            )),
        };
        Some(delay.min(self.max_delay))
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        Duration::from_nanos((delay.as_nanos() as f64 * factor).max(0.0) as u64)
    }
}
