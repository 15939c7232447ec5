//! Logical requests and their lifecycle states.

use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Duration, Instant};

use crate::transport::Target;

/// Caller-supplied identifier matching a completion back to its request.
pub trait CorrelationKey: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> CorrelationKey for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// Where a tracked request currently is.
///
/// ```text
/// Pending → InFlight → { done | Retrying → InFlight | done }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Admitted, waiting for a permit.
    Pending,
    /// An attempt is executing.
    InFlight,
    /// Waiting out a backoff delay or queued for the next attempt.
    Retrying,
}

/// One unit of work owned by the dispatcher until its completion is emitted.
#[derive(Debug, Clone)]
pub struct LogicalRequest<K> {
    key: K,
    target: Target,
    attempt_count: u32,
    created_at: Instant,
}

impl<K> LogicalRequest<K> {
    pub fn new(key: K, target: Target) -> Self {
        Self {
            key,
            target,
            attempt_count: 0,
            created_at: Instant::now(),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Attempts issued so far.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Record that another attempt is starting and return its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt_count += 1;
        self.attempt_count
    }

    pub fn into_key(self) -> K {
        self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempts_count_up() {
        let target = Target::parse("http://localhost/").unwrap();
        let mut request = LogicalRequest::new(7u64, target);
        assert_eq!(request.attempt_count(), 0);
        assert_eq!(request.begin_attempt(), 1);
        assert_eq!(request.begin_attempt(), 2);
        assert_eq!(request.attempt_count(), 2);
        assert_eq!(request.into_key(), 7);
    }
}
