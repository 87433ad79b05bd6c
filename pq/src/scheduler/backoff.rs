//! Backoff policies for retried requests
//!
//! A policy maps a 1-based retry attempt to the delay before that attempt is
//! re-enqueued. The scheduler only ever sees `Arc<dyn BackoffPolicy>`, so any
//! closure `Fn(u32) -> Duration` can stand in for the built-in policies.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Delay before the given retry attempt (1 = first retry)
pub trait BackoffPolicy: Send + Sync {
    fn delay(&self, attempt: u32) -> Duration;
}

impl<F> BackoffPolicy for F
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    fn delay(&self, attempt: u32) -> Duration {
        self(attempt)
    }
}

fn cap(delay: Duration, max: Option<Duration>) -> Duration {
    match max {
        Some(max) => delay.min(max),
        None => delay,
    }
}

/// `base * multiplier^(attempt - 1)`, saturating
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub multiplier: u32,
    pub max: Option<Duration>,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, multiplier: u32) -> Self {
        Self {
            base,
            multiplier,
            max: None,
        }
    }

    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = Some(max);
        self
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.saturating_pow(exponent);
        cap(self.base.saturating_mul(factor), self.max)
    }
}

/// `step * attempt`
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    pub step: Duration,
    pub max: Option<Duration>,
}

impl BackoffPolicy for LinearBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        cap(self.step.saturating_mul(attempt.max(1)), self.max)
    }
}

/// Same delay for every attempt
#[derive(Debug, Clone)]
pub struct ConstantBackoff(pub Duration);

impl BackoffPolicy for ConstantBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}

/// Scales an inner policy by a uniform factor in `[1 - ratio, 1 + ratio]`
pub struct Jittered<P> {
    pub inner: P,
    pub ratio: f64,
}

impl<P: BackoffPolicy> BackoffPolicy for Jittered<P> {
    fn delay(&self, attempt: u32) -> Duration {
        let delay = self.inner.delay(attempt);
        if self.ratio <= 0.0 {
            return delay;
        }
        let ratio = self.ratio.min(1.0);
        let factor = rand::rng().random_range((1.0 - ratio)..=(1.0 + ratio));
        Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
    }
}

/// Built-in strategy selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackoffStrategy {
    #[default]
    Exponential,
    Linear,
    Constant,
}

/// Backoff section of the scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub strategy: BackoffStrategy,

    /// Upper bound on any single delay
    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: Option<u64>,

    /// Jitter ratio in [0, 1]; 0 disables jitter
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            max_delay_ms: None,
            jitter: 0.0,
        }
    }
}

impl BackoffConfig {
    /// Build the configured policy around the given base delay
    pub fn build(&self, base: Duration, multiplier: u32) -> Arc<dyn BackoffPolicy> {
        let max = self.max_delay_ms.map(Duration::from_millis);
        match self.strategy {
            BackoffStrategy::Exponential => self.finish(ExponentialBackoff { base, multiplier, max }),
            BackoffStrategy::Linear => self.finish(LinearBackoff { step: base, max }),
            BackoffStrategy::Constant => self.finish(ConstantBackoff(cap(base, max))),
        }
    }

    fn finish<P: BackoffPolicy + 'static>(&self, policy: P) -> Arc<dyn BackoffPolicy> {
        if self.jitter > 0.0 {
            Arc::new(Jittered {
                inner: policy,
                ratio: self.jitter,
            })
        } else {
            Arc::new(policy)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_exponential_default_schedule() {
        let policy = ExponentialBackoff::new(ms(300), 3);
        assert_eq!(policy.delay(1), ms(300));
        assert_eq!(policy.delay(2), ms(900));
        assert_eq!(policy.delay(3), ms(2700));
    }

    #[test]
    fn test_exponential_cap() {
        let policy = ExponentialBackoff::new(ms(300), 3).with_max(ms(1000));
        assert_eq!(policy.delay(2), ms(900));
        assert_eq!(policy.delay(3), ms(1000));
    }

    #[test]
    fn test_exponential_saturates() {
        let policy = ExponentialBackoff::new(Duration::MAX, 3);
        assert_eq!(policy.delay(5), Duration::MAX);
    }

    #[test]
    fn test_linear_and_constant() {
        let linear = LinearBackoff {
            step: ms(100),
            max: None,
        };
        assert_eq!(linear.delay(1), ms(100));
        assert_eq!(linear.delay(4), ms(400));
        assert_eq!(ConstantBackoff(ms(50)).delay(9), ms(50));
    }

    #[test]
    fn test_closure_is_a_policy() {
        let policy: Arc<dyn BackoffPolicy> = Arc::new(|attempt: u32| ms(10 * attempt as u64));
        assert_eq!(policy.delay(3), ms(30));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let policy = Jittered {
            inner: ConstantBackoff(ms(1000)),
            ratio: 0.2,
        };
        for attempt in 1..50 {
            let delay = policy.delay(attempt);
            assert!(delay >= ms(800) && delay <= ms(1200), "{:?}", delay);
        }
    }

    #[test]
    fn test_jitter_saturates_instead_of_overflowing() {
        let policy = Jittered {
            inner: ConstantBackoff(Duration::MAX),
            ratio: 1.0,
        };
        for attempt in 1..20 {
            // Any factor above 1 would overflow a plain multiplication
            assert!(policy.delay(attempt) <= Duration::MAX);
        }
    }

    #[test]
    fn test_config_build_matches_strategy() {
        let config = BackoffConfig::default();
        let policy = config.build(ms(300), 3);
        assert_eq!(policy.delay(3), ms(2700));

        let config = BackoffConfig {
            strategy: BackoffStrategy::Linear,
            max_delay_ms: Some(500),
            jitter: 0.0,
        };
        let policy = config.build(ms(200), 3);
        assert_eq!(policy.delay(2), ms(400));
        assert_eq!(policy.delay(3), ms(500));
    }

    proptest! {
        #[test]
        fn prop_exponential_is_monotonic(base in 1u64..5_000, multiplier in 1u32..10, attempt in 1u32..20) {
            let policy = ExponentialBackoff::new(ms(base), multiplier);
            prop_assert!(policy.delay(attempt + 1) >= policy.delay(attempt));
        }

        #[test]
        fn prop_cap_is_respected(base in 1u64..5_000, multiplier in 1u32..10, attempt in 1u32..30, max in 1u64..60_000) {
            let policy = ExponentialBackoff::new(ms(base), multiplier).with_max(ms(max));
            prop_assert!(policy.delay(attempt) <= ms(max));
        }
    }
}
