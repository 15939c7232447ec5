//! Token bucket pacing newly issued permits.

use std::time::{Duration, Instant};

/// Slowest refill used when the caller passes a rate that is zero, negative or not finite.
const MIN_REFILL_RATE: f64 = 0.01;

/// A simple token bucket whose refill rate is supplied per call.
#[derive(Debug)]
pub struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    pub fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn refill(&mut self, capacity: f64, refill_rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;
    }

    /// Take one token, or report how long until one is available.
    pub fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> Result<(), Duration> {
        let refill_rate = if refill_rate.is_finite() {
            refill_rate.max(MIN_REFILL_RATE)
        } else {
            MIN_REFILL_RATE
        };
        self.refill(capacity.max(1.0), refill_rate);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(missing / refill_rate))
        }
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_full_then_waits() {
        let mut bucket = TokenBucket::new(2.0);
        assert!(bucket.try_acquire(2.0, 1.0).is_ok());
        assert!(bucket.try_acquire(2.0, 1.0).is_ok());

        let wait = bucket.try_acquire(2.0, 1.0).unwrap_err();
        assert!(wait > Duration::from_millis(900));
        assert!(wait <= Duration::from_secs(1));
    }

    #[test]
    fn test_wait_scales_with_rate() {
        let mut bucket = TokenBucket::new(1.0);
        bucket.try_acquire(1.0, 100.0).unwrap();
        let wait = bucket.try_acquire(1.0, 100.0).unwrap_err();
        assert!(wait <= Duration::from_millis(10));
    }

    #[test]
    fn test_zero_rate_waits_instead_of_panicking() {
        let mut bucket = TokenBucket::new(1.0);
        bucket.try_acquire(1.0, 0.0).unwrap();
        let wait = bucket.try_acquire(1.0, 0.0).unwrap_err();
        assert!(wait <= Duration::from_secs(100));
        assert!(bucket.try_acquire(1.0, f64::NAN).is_err());
    }

    #[test]
    fn test_refill_is_capped() {
        let mut bucket = TokenBucket::new(1.0);
        bucket.last_update -= Duration::from_secs(10);
        bucket.refill(1.0, 5.0);
        assert_eq!(bucket.tokens(), 1.0);
    }
}
