//! Outcome classification for completed exchanges.
//!
//! ```text
//! 2xx                                  → Success (after optional payload inspection)
//! retryable status / transient transport error
//!     attempts < max_attempts          → Transient
//!     attempts ≥ max_attempts          → Fatal(RetriesExhausted)
//! anything else                        → Fatal
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::FetchError;
use crate::governor::Signal;
use crate::resilience::policy::RetryPolicy;
use crate::transport::{Exchange, TransportError};

/// Bytes and timing of a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub status: u16,
    pub body: Vec<u8>,
    pub latency: Duration,
}

/// A failure worth another attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransientFailure {
    pub reason: String,
    pub retry_after: Option<Duration>,
}

/// Verdict on one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(Payload),
    Transient(TransientFailure),
    Fatal(FetchError),
}

impl Outcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::Transient(_))
    }
}

/// What a payload inspector concluded about a 2xx body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inspection {
    Accept,
    /// The body says "slow down" even though the status was 2xx.
    Throttled(String),
    Reject(FetchError),
}

/// Looks inside 2xx bodies for API-level errors.
pub trait PayloadInspector: Send + Sync + 'static {
    fn inspect(&self, body: &[u8]) -> Inspection;
}

/// Classify a completed exchange.
pub fn classify(result: Result<Exchange, TransportError>, attempt_count: u32, policy: &RetryPolicy) -> Outcome {
    match result {
        Ok(exchange) if exchange.is_success() => Outcome::Success(Payload {
            status: exchange.status,
            body: exchange.body,
            latency: exchange.elapsed,
        }),
        Ok(exchange) if policy.is_retryable_status(exchange.status) => transient(
            format!("HTTP status {}", exchange.status),
            exchange.retry_after.as_deref().and_then(parse_retry_after),
            attempt_count,
            policy,
        ),
        Ok(exchange) => Outcome::Fatal(FetchError::HttpStatus {
            status: exchange.status,
        }),
        Err(err) if err.is_transient() => transient(err.to_string(), None, attempt_count, policy),
        Err(err) => Outcome::Fatal(FetchError::Transport(err)),
    }
}

/// Governor feedback for a completed exchange.
pub fn signal_for(result: &Result<Exchange, TransportError>, policy: &RetryPolicy) -> Signal {
    match result {
        Ok(exchange) if exchange.is_success() => Signal::Clean,
        Ok(exchange) if policy.is_throttle_status(exchange.status) => Signal::Throttled,
        _ => Signal::Neutral,
    }
}

fn transient(reason: String, retry_after: Option<Duration>, attempt_count: u32, policy: &RetryPolicy) -> Outcome {
    if attempt_count >= policy.max_attempts {
        Outcome::Fatal(FetchError::RetriesExhausted {
            attempts: attempt_count,
            last: reason,
        })
    } else {
        Outcome::Transient(TransientFailure { reason, retry_after })
    }
}

/// Parse a `Retry-After` value, either (possibly fractional) seconds or an
/// HTTP-date. A date in the past means retry now.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<f64>() {
        return (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?;
    Some(
        (at.with_timezone(&Utc) - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}

/// Classifier bound to a policy and an optional payload inspector.
#[derive(Clone)]
pub struct Classifier {
    policy: RetryPolicy,
    inspector: Option<Arc<dyn PayloadInspector>>,
}

/// Outcome plus the signal to release the permit with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judgement {
    pub outcome: Outcome,
    pub signal: Signal,
}

impl Classifier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            inspector: None,
        }
    }

    pub fn with_inspector(mut self, inspector: Arc<dyn PayloadInspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn judge(&self, result: Result<Exchange, TransportError>, attempt_count: u32) -> Judgement {
        let signal = signal_for(&result, &self.policy);
        let outcome = classify(result, attempt_count, &self.policy);

        let (Outcome::Success(payload), Some(inspector)) = (&outcome, &self.inspector) else {
            return Judgement { outcome, signal };
        };

        match inspector.inspect(&payload.body) {
            Inspection::Accept => Judgement { outcome, signal },
            Inspection::Throttled(reason) => Judgement {
                outcome: transient(reason, None, attempt_count, &self.policy),
                signal: Signal::Throttled,
            },
            Inspection::Reject(err) => Judgement {
                outcome: Outcome::Fatal(err),
                signal: Signal::Neutral,
            },
        }
    }
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("policy", &self.policy)
            .field("inspector", &self.inspector.is_some())
            .finish()
    }
}
