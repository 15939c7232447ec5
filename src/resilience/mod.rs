//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Completed exchange:
//!     → classifier.rs (success / transient / fatal, governor signal)
//!     → On transient: backoff.rs (exponential delay, jitter, retry-after)
//! ```
//!
//! # Design Decisions
//! - Timeouts are enforced by the transport and again by the dispatcher
//! - Only load-related failures are retried; request-shape errors are fatal
//! - The attempt count lives on the request, so classification is a pure function

pub mod backoff;
pub mod classifier;
pub mod policy;

pub use backoff::calculate_backoff;
pub use classifier::{
    classify, parse_retry_after, signal_for, Classifier, Inspection, Judgement, Outcome, Payload,
    PayloadInspector, TransientFailure,
};
pub use policy::RetryPolicy;
