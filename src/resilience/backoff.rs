//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::resilience::policy::RetryPolicy;

/// Delay before the next attempt, given how many attempts were already made.
///
/// `min(base × multiplier^attempts, max)` plus up to `jitter` of that.
/// A server-supplied retry-after hint replaces the computed value, still
/// capped at `max_backoff`.
pub fn calculate_backoff(policy: &RetryPolicy, attempts: u32, retry_after: Option<Duration>) -> Duration {
    if attempts == 0 {
        return Duration::ZERO;
    }

    if let Some(hint) = retry_after {
        return hint.min(policy.max_backoff);
    }

    let exponent = attempts.min(i32::MAX as u32) as i32;
    let base = policy.base_backoff.as_secs_f64();
    let max = policy.max_backoff.as_secs_f64();
    let delay = (base * policy.backoff_multiplier.powi(exponent)).min(max);

    let jitter_range = delay * policy.jitter;
    let jitter = if jitter_range > 0.0 {
        rand::thread_rng().gen_range(0.0..jitter_range)
    } else {
        0.0
    };

    Duration::from_secs_f64((delay + jitter).min(max))
}
