//! Per-dispatcher request counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters shared by every batch of one dispatcher.
#[derive(Debug)]
pub struct FetchStats {
    started: Instant,
    attempts: AtomicU64,
    succeeded: AtomicU64,
    retried: AtomicU64,
    throttled: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time copy of [`FetchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsSummary {
    pub attempts: u64,
    pub succeeded: u64,
    pub retried: u64,
    pub throttled: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub rejected: u64,
    pub elapsed: Duration,
}

impl FetchStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            attempts: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_throttled(&self) {
        self.throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// A submission refused before it was admitted (duplicate key).
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            attempts: self.attempts.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            elapsed: self.started.elapsed(),
        }
    }
}

impl Default for FetchStats {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsSummary {
    /// Average attempts per second since the dispatcher was created.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.attempts as f64 / secs
        } else {
            0.0
        }
    }

    /// Terminal completions of any kind.
    pub fn completed(&self) -> u64 {
        self.succeeded + self.failed + self.cancelled
    }
}

impl std::ops::Add for StatsSummary {
    type Output = StatsSummary;

    fn add(self, other: StatsSummary) -> StatsSummary {
        StatsSummary {
            attempts: self.attempts + other.attempts,
            succeeded: self.succeeded + other.succeeded,
            retried: self.retried + other.retried,
            throttled: self.throttled + other.throttled,
            failed: self.failed + other.failed,
            cancelled: self.cancelled + other.cancelled,
            rejected: self.rejected + other.rejected,
            elapsed: self.elapsed.max(other.elapsed),
        }
    }
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempts: {:>6}, ok: {:>6}, retries: {:>5}, throttled: {:>5}, errors: {:>5}, cancelled: {:>5}, rate: {:>7.2}/s",
            self.attempts,
            self.succeeded,
            self.retried,
            self.throttled,
            self.failed,
            self.cancelled,
            self.rate()
        )
    }
}

/// Render per-source summaries plus a total line when there is more than one.
pub fn merge_summaries<'a, I>(summaries: I) -> Vec<(String, StatsSummary)>
where
    I: IntoIterator<Item = (&'a str, StatsSummary)>,
{
    let mut lines: Vec<(String, StatsSummary)> = summaries
        .into_iter()
        .filter(|(_, s)| s.attempts > 0 || s.completed() > 0)
        .map(|(name, s)| (name.to_string(), s))
        .collect();

    if lines.len() > 1 {
        let total = lines
            .iter()
            .fold(StatsSummary::default(), |acc, (_, s)| acc + *s);
        lines.push(("Total".to_string(), total));
    }
    lines
}
