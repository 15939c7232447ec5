//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Governor and dispatcher produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!     → stats.rs (in-process counters for the end-of-run summary)
//! ```
//!
//! # Design Decisions
//! - Metrics go through the `metrics` facade; the exporter is optional
//! - Every batch gets a UUID that flows through its log fields
//! - Sustained throttling is reported here, never as a per-request error

pub mod logging;
pub mod metrics;
pub mod stats;

pub use stats::{merge_summaries, FetchStats, StatsSummary};
