//! Backoff policy for callers that retry on their own.
//!
//! The relay answers devices after a single attempt because terminals retry
//! on any non-2xx. Batch replays have nobody behind them, so they wrap
//! [`crate::Deliver`] in this policy, one event at a time.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::client::DeliveryOutcome;

/// Retry policy for a single event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of delivery attempts, including the first.
    pub max_attempts: u32,

    /// Base delay for backoff calculation.
    pub base_delay: Duration,

    /// Upper bound for any single wait, `Retry-After` included.
    pub max_delay: Duration,

    /// Jitter fraction (0.0 to 1.0) applied around the computed delay.
    pub jitter_factor: f64,

    /// Strategy for calculating backoff delays.
    pub backoff_strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.1,
            backoff_strategy: BackoffStrategy::Exponential,
        }
    }
}

/// Strategy for calculating retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackoffStrategy {
    /// Fixed delay between retries.
    Fixed,
    /// Delay doubles each attempt.
    Exponential,
    /// Delay grows by the base amount each attempt.
    Linear,
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then try again.
    Retry {
        /// How long to wait before the next attempt
        delay: Duration,
    },
    /// Stop trying.
    GiveUp {
        /// Why no further attempt is made
        reason: String,
    },
}

impl RetryPolicy {
    /// A policy that never retries, as used on the device-facing path.
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// Decides whether attempt number `attempt` (1-based) should be followed
    /// by another one.
    ///
    /// Only retryable outcomes are retried. A downstream `Retry-After` wins
    /// over the computed backoff, capped at `max_delay`.
    pub fn decide(&self, attempt: u32, outcome: &DeliveryOutcome) -> RetryDecision {
        if !outcome.is_retryable() {
            return RetryDecision::GiveUp { reason: format!("non-retryable outcome: {outcome}") };
        }

        if attempt >= self.max_attempts {
            return RetryDecision::GiveUp {
                reason: format!("maximum attempts ({}) exceeded", self.max_attempts),
            };
        }

        let delay = match outcome.retry_after() {
            Some(requested) => requested.min(self.max_delay),
            None => self.delay_for_attempt(attempt),
        };

        RetryDecision::Retry { delay }
    }

    /// Delay before the attempt following `attempt`, jitter included.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay = match self.backoff_strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt.max(1)),
            BackoffStrategy::Exponential => {
                let exponent = attempt.saturating_sub(1).min(20);
                self.base_delay.saturating_mul(2_u32.saturating_pow(exponent))
            },
        };

        let capped_delay = base_delay.min(self.max_delay);
        apply_jitter(capped_delay, self.jitter_factor).min(self.max_delay)
    }
}

/// Randomizes a delay by ±`jitter_factor` so replays started together
/// spread out.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 || duration.is_zero() {
        return duration;
    }

    let clamped_jitter = jitter_factor.clamp(0.0, 1.0);

    let mut rng = rand::rng();
    let jitter_range = duration.as_secs_f64() * clamped_jitter;
    let jitter_offset = rng.random_range(-jitter_range..=jitter_range);
    let jittered_secs = duration.as_secs_f64() + jitter_offset;

    Duration::from_secs_f64(jittered_secs.max(0.0))
}
