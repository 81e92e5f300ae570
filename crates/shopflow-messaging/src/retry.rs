//! Backoff schedule for outbox records whose publish failed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::RngExt;

#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    /// Failures tolerated before a record is dead-lettered.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay applied as random spread in both directions.
    pub jitter: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            jitter: 0.1,
        }
    }
}

impl Backoff {
    /// Delay after the `attempt`-th failure (1-based), before jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    fn jittered(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        if self.jitter <= 0.0 {
            return delay;
        }
        let spread = rand::rng().random_range(-self.jitter..=self.jitter);
        delay.mul_f64((1.0 + spread).max(0.0))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryPolicy {
    /// Failed records stay failed.
    Never,
    Backoff(Backoff),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Backoff(Backoff::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAt(DateTime<Utc>),
    GiveUp,
    DeadLetter,
}

impl RetryPolicy {
    /// Outcome for a record that has now failed `retry_count` times.
    pub fn decide(&self, retry_count: u32, now: DateTime<Utc>) -> RetryDecision {
        match self {
            Self::Never => RetryDecision::GiveUp,
            Self::Backoff(backoff) if retry_count >= backoff.max_retries => {
                RetryDecision::DeadLetter
            }
            Self::Backoff(backoff) => {
                let delay = chrono::Duration::from_std(backoff.jittered(retry_count))
                    .unwrap_or_else(|_| chrono::Duration::days(1));
                RetryDecision::RetryAt(now + delay)
            }
        }
    }
}
