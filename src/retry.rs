use std::time::Duration;
use tracing::warn;

/// Capped exponential backoff: `min(initial * 2^(attempt-1), max)`.
///
/// `max_attempts` of `None` retries forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub const fn unbounded() -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(300),
            max_attempts: None,
        }
    }

    pub const fn bounded(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(300),
            max_attempts: Some(max_attempts),
        }
    }

    pub const fn with_delays(self, initial_delay: Duration, max_delay: Duration) -> RetryPolicy {
        RetryPolicy {
            initial_delay,
            max_delay,
            ..self
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.initial_delay
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: *self,
            attempt: 0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::unbounded()
    }
}

/// Retry state for one operation.
#[derive(Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    attempt: u32,
}

impl Backoff {
    /// Failed attempts so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Records a failure and sleeps before the next try. Returns `false`
    /// without sleeping once the attempt ceiling is reached.
    pub async fn wait(&mut self, what: &str) -> bool {
        self.attempt += 1;
        if let Some(max) = self.policy.max_attempts {
            if self.attempt >= max {
                return false;
            }
        }
        let delay = self.policy.delay_for(self.attempt);
        warn!(
            "[retry {}] {} failed, sleeping for {:.1}s",
            self.attempt,
            what,
            delay.as_secs_f32()
        );
        tokio::time::sleep(delay).await;
        true
    }
}
