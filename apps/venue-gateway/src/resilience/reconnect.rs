//! Reconnect backoff policy.
//!
//! Deterministic exponential backoff: the delay for attempt `n` is
//! `base * 2^min(n, cap_exponent)`, so delays grow then plateau. The
//! policy is exhausted after `max_attempts` attempts.

use std::time::Duration;

/// Backoff schedule parameters.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectConfig {
    /// Delay for attempt 0.
    pub base_delay: Duration,
    /// Doubling stops after this exponent.
    pub cap_exponent: u32,
    /// Attempts before `next_delay` returns `None`.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            cap_exponent: 5,
            max_attempts: 10,
        }
    }
}

/// Stateful backoff iterator for one reconnect episode.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt: u32,
}

impl ReconnectPolicy {
    /// New policy at attempt 0.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Delay to wait before the next attempt, `None` once exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.config.max_attempts {
            return None;
        }
        let exponent = self.attempt.min(self.config.cap_exponent);
        let delay = self.config.base_delay * 2u32.pow(exponent);
        self.attempt += 1;
        Some(delay)
    }

    /// Reset after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Attempts consumed so far in this episode.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_then_plateau() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            base_delay: Duration::from_secs(1),
            cap_exponent: 5,
            max_attempts: 8,
        });

        let delays: Vec<u64> = std::iter::from_fn(|| policy.next_delay())
            .map(|d| d.as_secs())
            .collect();

        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 32, 32]);
    }

    #[test]
    fn exhausts_after_max_attempts() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            base_delay: Duration::from_millis(100),
            cap_exponent: 2,
            max_attempts: 3,
        });

        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert_eq!(policy.next_delay(), None);
        assert_eq!(policy.attempt(), 3);
    }

    #[test]
    fn reset_restarts_the_schedule() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());

        assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));

        policy.reset();

        assert_eq!(policy.attempt(), 0);
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn delays_are_monotonic_non_decreasing() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        let mut previous = Duration::ZERO;
        while let Some(delay) = policy.next_delay() {
            assert!(delay >= previous);
            previous = delay;
        }
    }
}
