//! Scheduler configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::backoff::BackoffConfig;

/// Where a request goes back into the queue after its backoff elapses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryPlacement {
    /// Behind everything already queued; later submissions may overtake it
    #[default]
    Tail,
    /// In front of everything already queued
    Head,
}

/// Rejected scheduler configuration
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("backoff-multiplier must be at least 1, got {0}")]
    ZeroMultiplier(u32),

    #[error("backoff jitter must be within [0, 1], got {0}")]
    JitterOutOfRange(f64),
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Minimum gap enforced between consecutive dispatches
    #[serde(rename = "pacing-interval-ms")]
    pub pacing_interval_ms: u64,

    /// Retry ceiling applied to submissions that don't override it
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Growth factor of the exponential backoff
    #[serde(rename = "backoff-multiplier")]
    pub backoff_multiplier: u32,

    /// Backoff strategy details
    pub backoff: BackoffConfig,

    /// Queue position of retried requests
    #[serde(rename = "retry-placement")]
    pub retry_placement: RetryPlacement,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pacing_interval_ms: 300,
            max_retries: 3,
            backoff_multiplier: 3,
            backoff: BackoffConfig::default(),
            retry_placement: RetryPlacement::Tail,
        }
    }
}

impl SchedulerConfig {
    /// Get the pacing interval as a Duration
    pub fn pacing_interval(&self) -> Duration {
        Duration::from_millis(self.pacing_interval_ms)
    }

    /// Check the values that would make the scheduler misbehave
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backoff_multiplier == 0 {
            return Err(ConfigError::ZeroMultiplier(self.backoff_multiplier));
        }
        if !(0.0..=1.0).contains(&self.backoff.jitter) {
            return Err(ConfigError::JitterOutOfRange(self.backoff.jitter));
        }
        Ok(())
    }
}
