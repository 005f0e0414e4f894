use std::time::Duration;

/// How often a job may go back to `Pending` after connection failures, and
/// how long it waits each time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of requeues per job. The next transient failure fails it.
    pub ceiling: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            ceiling: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Whether a job already requeued `attempts` times may be requeued again.
    pub fn should_requeue(&self, attempts: u32) -> bool {
        attempts < self.ceiling
    }

    /// Backoff before the `attempt`-th retry (1-based): doubles each time,
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}
