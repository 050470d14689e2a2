//! Exponential-backoff policy for broker connect attempts.
//!
//! The broker may be briefly unreachable at startup, so establishing a
//! session is retried a bounded number of times with growing delays. The
//! policy is a plain value; callers pull delays from a [`Backoff`] schedule
//! between attempts.

use std::time::Duration;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(12),
            multiplier: 1.5,
        }
    }
}

impl RetryPolicy {
    /// Policy with no waiting between attempts. Useful in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Start a fresh delay schedule.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: *self,
            attempt: 1,
            delay: self.initial_delay.min(self.max_delay),
        }
    }
}

/// Running delay schedule for one connect sequence.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempt: u32,
    delay: Duration,
}

impl Backoff {
    /// 1-based number of the attempt about to be made.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay to wait before the next attempt, or `None` once the attempt
    /// budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.policy.max_attempts.max(1) {
            return None;
        }
        let delay = self.delay;
        let grown = delay.as_secs_f64() * self.policy.multiplier;
        self.delay = Duration::try_from_secs_f64(grown)
            .unwrap_or(self.policy.max_delay)
            .min(self.policy.max_delay);
        self.attempt += 1;
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delays(policy: RetryPolicy) -> Vec<Duration> {
        let mut backoff = policy.backoff();
        std::iter::from_fn(|| backoff.next_delay()).collect()
    }

    #[test]
    fn default_schedule_waits_four_then_six_seconds() {
        assert_eq!(
            delays(RetryPolicy::default()),
            [Duration::from_secs(4), Duration::from_secs(6)]
        );
    }

    #[test]
    fn longer_schedule_settles_at_the_cap() {
        let policy = RetryPolicy {
            max_attempts: 6,
            ..Default::default()
        };
        let secs: Vec<_> = delays(policy).iter().map(Duration::as_secs).collect();
        assert_eq!(secs, [4, 6, 9, 12, 12]);
    }

    #[test]
    fn initial_delay_above_cap_is_clamped() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        };
        assert_eq!(delays(policy), [Duration::from_secs(5); 2]);
    }

    #[test]
    fn immediate_policy_never_waits() {
        assert_eq!(delays(RetryPolicy::immediate(4)), [Duration::ZERO; 3]);
    }

    #[test]
    fn default_policy_allows_three_attempts() {
        let mut backoff = RetryPolicy::default().backoff();
        assert_eq!(backoff.attempt(), 1);
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert_eq!(backoff.attempt(), 3);
        assert!(backoff.next_delay().is_none());
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let mut backoff = RetryPolicy::immediate(0).backoff();
        assert_eq!(backoff.attempt(), 1);
        assert!(backoff.next_delay().is_none());
    }
}
