//! Reconnection strategies
//!
//! When the connection to the chat backend drops, the strategy decides how
//! long to wait before the next handshake, or whether to stop trying.
//!
//! # Built-in Strategies
//!
//! - **ExponentialBackoff**: `min(base * 2^attempt, cap)`, default 1s to 60s
//! - **FixedDelay**: constant delay between attempts
//! - **NoReconnect**: give up on the first failure
//!
//! The failure ceiling itself lives in [`RetryDecision::evaluate`], so any
//! strategy can be paired with any ceiling.
//!
//! # Examples
//!
//! ```rust
//! use streamchat_client::{ExponentialBackoff, RetryDecision};
//! use std::time::Duration;
//!
//! let backoff = ExponentialBackoff::default();
//! assert_eq!(backoff.delay_for(3), Duration::from_secs(8));
//!
//! // Fifth consecutive failure with a ceiling of five
//! assert_eq!(RetryDecision::evaluate(5, 5, &backoff), RetryDecision::GiveUp);
//! ```

use std::time::Duration;

/// Trait for reconnection strategies
///
/// The strategy is consulted once per failure. `reset()` is called after a
/// successful handshake or an explicit connect so the next outage starts
/// from the shortest delay again.
pub trait ReconnectionStrategy: Send + Sync {
    /// Delay before retry number `attempt` (0-indexed), `None` to stop
    fn next_delay(&mut self, attempt: u32) -> Option<Duration>;

    /// Reset accumulated state
    fn reset(&mut self);
}

/// Exponential backoff with optional jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
    jitter: bool,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff strategy
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts: None,
            jitter: false,
        }
    }

    /// Stop after this many retries regardless of the client ceiling
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Add up to 25% random extra delay to each retry
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Deterministic delay for retry `attempt`, before jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return None;
            }
        }

        let delay = self.delay_for(attempt);
        if !self.jitter {
            return Some(delay);
        }

        use rand::Rng;
        let delay_ms = delay.as_millis() as u64;
        let jitter_ms = rand::thread_rng().gen_range(0..=(delay_ms / 4));
        Some(delay + Duration::from_millis(jitter_ms))
    }

    fn reset(&mut self) {}
}

/// Fixed delay reconnection strategy
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return None;
            }
        }
        Some(self.delay)
    }

    fn reset(&mut self) {}
}

/// Never reconnect automatically
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReconnect;

impl ReconnectionStrategy for NoReconnect {
    fn next_delay(&mut self, _attempt: u32) -> Option<Duration> {
        None
    }

    fn reset(&mut self) {}
}

/// Outcome of a connection failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the delay
    Retry { attempt: u32, delay: Duration },
    /// Ceiling reached; wait for a manual connect
    GiveUp,
}

impl RetryDecision {
    /// Decide what follows consecutive failure number `failures` (1-based)
    ///
    /// Reaching `ceiling` failures is terminal. Otherwise retry number
    /// `failures - 1` is scheduled with the backoff delay, so a ceiling of
    /// five yields retries after 1, 2, 4 and 8 seconds.
    pub fn evaluate(failures: u32, ceiling: u32, backoff: &ExponentialBackoff) -> Self {
        match Self::attempt_below_ceiling(failures, ceiling) {
            Some(attempt) => RetryDecision::Retry {
                attempt,
                delay: backoff.delay_for(attempt),
            },
            None => RetryDecision::GiveUp,
        }
    }

    /// Same ceiling rule, with the delay supplied by an arbitrary strategy
    ///
    /// The strategy can still give up early by returning `None`.
    pub fn with_strategy(
        failures: u32,
        ceiling: u32,
        strategy: &mut dyn ReconnectionStrategy,
    ) -> Self {
        Self::attempt_below_ceiling(failures, ceiling)
            .and_then(|attempt| {
                strategy
                    .next_delay(attempt)
                    .map(|delay| RetryDecision::Retry { attempt, delay })
            })
            .unwrap_or(RetryDecision::GiveUp)
    }

    fn attempt_below_ceiling(failures: u32, ceiling: u32) -> Option<u32> {
        let failures = failures.max(1);
        (failures < ceiling).then(|| failures - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backoff_doubles_to_cap() {
        let backoff = ExponentialBackoff::default();
        let delays: Vec<u64> = (0..8).map(|a| backoff.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 60, 60]);
    }

    #[test]
    fn test_backoff_large_attempt_saturates() {
        let backoff = ExponentialBackoff::default();
        assert_eq!(backoff.delay_for(40), Duration::from_secs(60));
        assert_eq!(backoff.delay_for(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_matches_formula_below_cap() {
        let backoff = ExponentialBackoff::default();
        for attempt in 0..20u32 {
            let expected = 2u64.pow(attempt).min(60);
            assert_eq!(backoff.delay_for(attempt), Duration::from_secs(expected));
        }
    }

    #[test]
    fn test_exponential_backoff_max_attempts() {
        let mut strategy =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10))
                .with_max_attempts(3);

        assert_eq!(strategy.next_delay(0), Some(Duration::from_millis(100)));
        assert_eq!(strategy.next_delay(1), Some(Duration::from_millis(200)));
        assert_eq!(strategy.next_delay(2), Some(Duration::from_millis(400)));
        assert!(strategy.next_delay(3).is_none());
    }

    #[test]
    fn test_exponential_backoff_reset() {
        let mut strategy = ExponentialBackoff::default();
        assert_eq!(strategy.next_delay(5), Some(Duration::from_secs(32)));
        strategy.reset();
        assert_eq!(strategy.next_delay(5), Some(Duration::from_secs(32)));
        assert_eq!(strategy.next_delay(0), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_exponential_backoff_jitter_bounds() {
        let mut strategy =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10)).with_jitter();
        for _ in 0..50 {
            let delay = strategy.next_delay(0).unwrap();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(125));
        }
    }

    #[test]
    fn test_fixed_delay() {
        let mut strategy = FixedDelay::new(Duration::from_secs(1)).with_max_attempts(2);
        assert_eq!(strategy.next_delay(0), Some(Duration::from_secs(1)));
        assert_eq!(strategy.next_delay(1), Some(Duration::from_secs(1)));
        assert!(strategy.next_delay(2).is_none());
    }

    #[test]
    fn test_no_reconnect() {
        let mut strategy = NoReconnect;
        assert!(strategy.next_delay(0).is_none());
    }

    #[test]
    fn test_ceiling_five_schedules_four_retries() {
        let backoff = ExponentialBackoff::default();
        let decisions: Vec<RetryDecision> = (1..=5)
            .map(|failures| RetryDecision::evaluate(failures, 5, &backoff))
            .collect();

        let secs = |attempt, s| RetryDecision::Retry {
            attempt,
            delay: Duration::from_secs(s),
        };
        assert_eq!(
            decisions,
            vec![secs(0, 1), secs(1, 2), secs(2, 4), secs(3, 8), RetryDecision::GiveUp]
        );
    }

    #[test]
    fn test_ceiling_six_reaches_sixteen_seconds() {
        let backoff = ExponentialBackoff::default();
        assert_eq!(
            RetryDecision::evaluate(5, 6, &backoff),
            RetryDecision::Retry {
                attempt: 4,
                delay: Duration::from_secs(16)
            }
        );
        assert_eq!(RetryDecision::evaluate(6, 6, &backoff), RetryDecision::GiveUp);
        assert_eq!(RetryDecision::evaluate(60, 6, &backoff), RetryDecision::GiveUp);
    }

    #[test]
    fn test_with_strategy_respects_strategy_give_up() {
        let mut fixed = FixedDelay::new(Duration::from_millis(10)).with_max_attempts(1);
        assert_eq!(
            RetryDecision::with_strategy(1, 5, &mut fixed),
            RetryDecision::Retry {
                attempt: 0,
                delay: Duration::from_millis(10)
            }
        );
        assert_eq!(RetryDecision::with_strategy(2, 5, &mut fixed), RetryDecision::GiveUp);
        assert_eq!(
            RetryDecision::with_strategy(1, 5, &mut NoReconnect),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_zero_ceiling_never_retries() {
        let backoff = ExponentialBackoff::default();
        assert_eq!(RetryDecision::evaluate(1, 0, &backoff), RetryDecision::GiveUp);
        assert_eq!(RetryDecision::evaluate(1, 1, &backoff), RetryDecision::GiveUp);
    }
}
