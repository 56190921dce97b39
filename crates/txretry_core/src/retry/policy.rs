//! Retry policy.

use std::time::Duration;

/// Limits and pacing applied on top of the store's retry decisions.
///
/// The policy never turns a fatal error into a retry. It can only stop a
/// loop the store would otherwise keep retrying, or slow it down.
///
/// The default is unbounded with no delay: the loop runs until the unit of
/// work commits or the store reports a fatal error.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first (None = unbounded).
    pub max_attempts: Option<u32>,
    /// Wall-clock budget for the whole run (None = unbounded).
    pub deadline: Option<Duration>,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% random jitter to delays.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl RetryPolicy {
    /// Retries until success or a fatal error, without delay.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            deadline: None,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Gives up after `max_attempts` attempts.
    #[must_use]
    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            ..Self::unbounded()
        }
    }

    /// Sets the wall-clock budget.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Enables exponential backoff between `initial` and `max`.
    #[must_use]
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        if self.backoff_multiplier <= 1.0 {
            self.backoff_multiplier = 2.0;
        }
        self
    }

    /// Sets the backoff multiplier.
    ///
    /// Values below 1.0 and non-finite values are treated as 1.0, which
    /// keeps the delay constant at the initial backoff.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = if multiplier.is_finite() && multiplier >= 1.0 {
            multiplier
        } else {
            1.0
        };
        self
    }

    /// Enables or disables jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns true if another attempt is allowed after `attempts` attempts
    /// taking `elapsed` in total.
    #[must_use]
    pub fn allows_another(&self, attempts: u32, elapsed: Duration) -> bool {
        if self.max_attempts.is_some_and(|max| attempts >= max) {
            return false;
        }
        !self.deadline.is_some_and(|deadline| elapsed >= deadline)
    }

    /// Returns the time left before the deadline, if one is set.
    #[must_use]
    pub fn remaining(&self, elapsed: Duration) -> Option<Duration> {
        self.deadline.map(|deadline| deadline.saturating_sub(elapsed))
    }

    /// Calculates the delay before retry number `retry` (1-indexed).
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 || self.initial_backoff.is_zero() {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
        let base = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let delay = base.min(self.max_backoff.as_secs_f64());

        let delay = if self.jitter {
            delay + delay * 0.25 * rand::random::<f64>()
        } else {
            delay
        };
        Duration::try_from_secs_f64(delay).unwrap_or(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_ms(delay: Duration, ms: f64) -> bool {
        (delay.as_secs_f64() * 1000.0 - ms).abs() < 1e-3
    }

    #[test]
    fn unbounded_never_stops() {
        let policy = RetryPolicy::unbounded();
        assert!(policy.allows_another(u32::MAX - 1, Duration::from_secs(3600)));
        assert_eq!(policy.delay_for_retry(10), Duration::ZERO);
    }

    #[test]
    fn bounded_counts_attempts() {
        let policy = RetryPolicy::bounded(3);
        assert!(policy.allows_another(2, Duration::ZERO));
        assert!(!policy.allows_another(3, Duration::ZERO));
        assert_eq!(RetryPolicy::bounded(0).max_attempts, Some(1));
    }

    #[test]
    fn deadline_stops() {
        let policy = RetryPolicy::unbounded().with_deadline(Duration::from_millis(50));
        assert!(policy.allows_another(1, Duration::from_millis(10)));
        assert!(!policy.allows_another(1, Duration::from_millis(50)));
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let policy = RetryPolicy::unbounded()
            .with_backoff(Duration::from_millis(10), Duration::from_millis(50))
            .with_jitter(false);

        assert_eq!(policy.delay_for_retry(0), Duration::ZERO);
        assert!(approx_ms(policy.delay_for_retry(1), 10.0));
        assert!(approx_ms(policy.delay_for_retry(2), 20.0));
        assert!(approx_ms(policy.delay_for_retry(3), 40.0));
        assert!(approx_ms(policy.delay_for_retry(4), 50.0));
    }

    #[test]
    fn bad_multiplier_is_clamped() {
        for multiplier in [-2.0, 0.5, f64::NAN, f64::INFINITY] {
            let policy = RetryPolicy::unbounded()
                .with_backoff(Duration::from_millis(1), Duration::from_millis(10))
                .with_backoff_multiplier(multiplier);
            assert_eq!(policy.backoff_multiplier, 1.0);
            for retry in 1..6 {
                assert!(approx_ms(policy.delay_for_retry(retry), 1.0));
            }
        }
    }

    #[test]
    fn custom_multiplier() {
        let policy = RetryPolicy::unbounded()
            .with_backoff(Duration::from_millis(10), Duration::from_secs(1))
            .with_backoff_multiplier(3.0);
        assert!(approx_ms(policy.delay_for_retry(3), 90.0));
    }

    #[test]
    fn overflowing_delay_saturates_at_max() {
        let policy = RetryPolicy::unbounded()
            .with_backoff(Duration::from_millis(1), Duration::from_millis(30))
            .with_backoff_multiplier(1e300);
        assert!(approx_ms(policy.delay_for_retry(3), 30.0));
        assert!(approx_ms(policy.delay_for_retry(u32::MAX), 30.0));
    }

    #[test]
    fn remaining_budget() {
        let policy = RetryPolicy::unbounded().with_deadline(Duration::from_millis(50));
        assert_eq!(
            policy.remaining(Duration::from_millis(20)),
            Some(Duration::from_millis(30))
        );
        assert_eq!(policy.remaining(Duration::from_secs(1)), Some(Duration::ZERO));
        assert_eq!(RetryPolicy::unbounded().remaining(Duration::ZERO), None);
    }

    #[test]
    fn jitter_stays_within_quarter() {
        let policy = RetryPolicy::unbounded()
            .with_backoff(Duration::from_millis(100), Duration::from_millis(100))
            .with_jitter(true);
        for _ in 0..20 {
            let ms = policy.delay_for_retry(1).as_secs_f64() * 1000.0;
            assert!(ms > 99.999 && ms < 125.001, "delay {ms}ms out of range");
        }
    }
}
