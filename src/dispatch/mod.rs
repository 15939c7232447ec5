//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! submit(iter of (key, Target))
//!     → driver task (one per batch)
//!         → pull next request (retry queue first, then source)
//!         → Governor::acquire
//!         → spawn attempt task
//!             → Transport::execute (bounded by the call timeout)
//!             → Classifier::judge
//!             → Governor::release(permit, signal)
//!             → Success | Fatal  → Completion on the batch channel
//!             → Transient        → backoff sleep → retry queue
//! ```
//!
//! # Design Decisions
//! - The source iterator is pulled lazily and at most `max_outstanding`
//!   requests are tracked, so memory does not grow with batch size
//! - Completions arrive in completion order; the key is the only correlation
//! - Attempts for one key never overlap: the next attempt is only queued
//!   after the previous one released its permit
//! - Cancellation stops permit acquisition; in-flight attempts finish and
//!   everything else completes as `FetchError::Cancelled`

pub mod batch;
pub mod dispatcher;
pub mod request;
pub mod tracker;

pub use batch::{Batch, Completion};
pub use dispatcher::Dispatcher;
pub use request::{CorrelationKey, LogicalRequest, RequestState};
pub use tracker::BatchProgress;
