//! Commit Retry Policy
//!
//! Exponential backoff with jitter for failed batch commits. A commit
//! failure rolls the whole batch back; the batch is retried up to a
//! bounded attempt count, after which the failure is surfaced as fatal
//! rather than silently dropped (these are the pipeline's only durable
//! writes).

use std::time::Duration;

use rand::Rng;

/// Bounds for batch-commit retries.
#[derive(Debug, Clone)]
pub struct CommitRetryPolicy {
    /// Maximum number of attempts per batch, including the first.
    pub max_attempts: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
    /// Multiplier for exponential growth.
    pub multiplier: f64,
    /// Jitter factor (0.2 = ±20%).
    pub jitter_factor: f64,
}

impl Default for CommitRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

/// Stateful backoff calculator for one batch's retry sequence.
#[derive(Debug)]
pub struct CommitBackoff {
    attempt: u32,
    current_ms: f64,
    max_ms: f64,
    multiplier: f64,
    jitter_factor: f64,
}

impl CommitBackoff {
    /// Start a fresh backoff sequence from a policy.
    #[must_use]
    pub fn new(policy: &CommitRetryPolicy) -> Self {
        Self {
            attempt: 0,
            current_ms: policy.initial_backoff.as_millis() as f64,
            max_ms: policy.max_backoff.as_millis() as f64,
            multiplier: policy.multiplier,
            jitter_factor: policy.jitter_factor,
        }
    }

    /// Next delay to wait before retrying, with jitter applied.
    pub fn next_backoff(&mut self) -> Duration {
        let base = self.current_ms.min(self.max_ms);
        self.current_ms = (self.current_ms * self.multiplier).min(self.max_ms);
        self.attempt += 1;

        let jitter_span = base * self.jitter_factor;
        let jitter = if jitter_span > 0.0 {
            rand::rng().random_range(-jitter_span..=jitter_span)
        } else {
            0.0
        };

        Duration::from_millis((base + jitter).max(0.0) as u64)
    }

    /// Retries attempted so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter_policy() -> CommitRetryPolicy {
        CommitRetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(400),
            multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let mut backoff = CommitBackoff::new(&no_jitter_policy());

        assert_eq!(backoff.next_backoff(), Duration::from_millis(100));
        assert_eq!(backoff.next_backoff(), Duration::from_millis(200));
        assert_eq!(backoff.next_backoff(), Duration::from_millis(400));
        // Capped at max_backoff from here on.
        assert_eq!(backoff.next_backoff(), Duration::from_millis(400));
        assert_eq!(backoff.attempts(), 4);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = CommitRetryPolicy {
            jitter_factor: 0.2,
            ..no_jitter_policy()
        };
        let mut backoff = CommitBackoff::new(&policy);

        for _ in 0..50 {
            let mut fresh = CommitBackoff::new(&policy);
            let d = fresh.next_backoff();
            assert!(d >= Duration::from_millis(80), "too short: {d:?}");
            assert!(d <= Duration::from_millis(120), "too long: {d:?}");
        }
        // Exercise the stateful path as well.
        let _ = backoff.next_backoff();
        let second = backoff.next_backoff();
        assert!(second >= Duration::from_millis(160));
        assert!(second <= Duration::from_millis(240));
    }

    #[test]
    fn default_policy_is_bounded() {
        let policy = CommitRetryPolicy::default();
        assert!(policy.max_attempts >= 1);
        assert!(policy.initial_backoff <= policy.max_backoff);
    }
}
