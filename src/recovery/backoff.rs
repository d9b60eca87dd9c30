/// Doubling backoff schedule for the retry loop
///
/// Delay before attempt k (k >= 2) is `initial_delay * 2^(k-2)`, capped at
/// `max_delay`. With the defaults this yields the 1s, 2s, 4s, 8s, 16s
/// schedule. Jitter is available for callers that fan out many processes,
/// but defaults to zero so the schedule stays exact.
use rand::Rng;
use std::time::Duration;

/// Default base delay before the second attempt
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Default cap on a single inter-attempt delay; above the documented
/// schedule so defaults never truncate it
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct Backoff {
    /// Delay before the second attempt
    initial_delay: Duration,

    /// Cap on any single delay
    max_delay: Duration,

    /// Jitter factor (0.0 - 1.0); zero keeps the schedule exact
    jitter: f64,
}

impl Backoff {
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            jitter: 0.0,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Delay to sleep before the given attempt (1-based).
    ///
    /// The first attempt always runs immediately.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        // Exponent is bounded: beyond 32 doublings the cap has long won
        let exp = (attempt - 2).min(32);
        let exponential_ms = self.initial_delay.as_millis().saturating_mul(1u128 << exp);
        let capped_ms = exponential_ms.min(self.max_delay.as_millis());

        if self.jitter == 0.0 {
            return Duration::from_millis(capped_ms as u64);
        }

        // delay ± (delay * jitter)
        let jitter_range = capped_ms as f64 * self.jitter;
        let offset = (rand::thread_rng().gen::<f64>() - 0.5) * 2.0 * jitter_range;
        let final_ms = (capped_ms as f64 + offset).max(0.0);
        Duration::from_millis(final_ms as u64)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn first_attempt_has_no_delay() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay_before(1), Duration::ZERO);
        assert_eq!(backoff.delay_before(0), Duration::ZERO);
    }

    #[test]
    fn documented_schedule() {
        let backoff = Backoff::default();

        assert_eq!(backoff.delay_before(2), Duration::from_secs(1));
        assert_eq!(backoff.delay_before(3), Duration::from_secs(2));
        assert_eq!(backoff.delay_before(4), Duration::from_secs(4));
        assert_eq!(backoff.delay_before(5), Duration::from_secs(8));
        assert_eq!(backoff.delay_before(6), Duration::from_secs(16));
    }

    #[test]
    fn caps_at_max_delay() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(backoff.delay_before(20), Duration::from_secs(1));
    }

    #[test]
    fn large_attempt_index_does_not_overflow() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
        assert_eq!(backoff.delay_before(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn jitter_produces_varied_delays() {
        let backoff =
            Backoff::new(Duration::from_millis(100), Duration::from_secs(10)).with_jitter(0.5);

        let delays: Vec<_> = (0..10)
            .map(|_| backoff.delay_before(3).as_millis())
            .collect();

        let all_same = delays.windows(2).all(|w| w[0] == w[1]);
        assert!(!all_same, "jitter should produce varied delays");
    }

    proptest! {
        #[test]
        fn monotonically_non_decreasing(initial_ms in 1u64..5_000, attempt in 2u32..40) {
            let backoff = Backoff::new(
                Duration::from_millis(initial_ms),
                Duration::from_secs(300),
            );
            prop_assert!(backoff.delay_before(attempt + 1) >= backoff.delay_before(attempt));
        }
    }
}
