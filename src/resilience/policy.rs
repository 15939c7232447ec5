//! Retry policy built from configuration.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::config::RetryConfig;

/// How transient failures are retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
    pub jitter: f64,
    pub retryable_status_codes: BTreeSet<u16>,
    pub throttle_status_codes: BTreeSet<u16>,
}

impl RetryPolicy {
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }

    pub fn is_throttle_status(&self, status: u16) -> bool {
        self.throttle_status_codes.contains(&status)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            backoff_multiplier: config.backoff_multiplier,
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            jitter: config.jitter,
            retryable_status_codes: config.retryable_status_codes.clone(),
            throttle_status_codes: config.throttle_status_codes.clone(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}
