//! Result sink adapters.
//!
//! # Data Flow
//! ```text
//! Batch (stream of Completion)
//!     → pump()
//!     → ResultSink::accept (validation / storage live behind this)
//!     → ResultSink::finish
//! ```
//!
//! # Design Decisions
//! - Sinks never see transient failures, only terminal completions
//! - A sink error cancels the batch instead of silently dropping results

pub mod json_lines;
pub mod memory;

use async_trait::async_trait;
use futures_util::StreamExt;
use thiserror::Error;

use crate::dispatch::{Batch, Completion, CorrelationKey};
use crate::error::FetchError;

pub use json_lines::JsonLinesSink;
pub use memory::MemorySink;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("sink rejected completion: {0}")]
    Rejected(String),
}

/// Receives terminal completions downstream of the dispatcher.
#[async_trait]
pub trait ResultSink<K: CorrelationKey>: Send {
    async fn accept(&mut self, completion: Completion<K>) -> Result<(), SinkError>;

    /// Flush buffered output once the batch has drained.
    async fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Tally of what a pump delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkReport {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl SinkReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }

    fn count<K>(&mut self, completion: &Completion<K>) {
        match &completion.outcome {
            Ok(_) => self.succeeded += 1,
            Err(FetchError::Cancelled) => self.cancelled += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Drain `batch` into `sink`. On a sink error the batch is cancelled.
pub async fn pump<K, S>(mut batch: Batch<K>, sink: &mut S) -> Result<SinkReport, SinkError>
where
    K: CorrelationKey,
    S: ResultSink<K> + ?Sized,
{
    let mut report = SinkReport::default();
    while let Some(completion) = batch.next().await {
        report.count(&completion);
        if let Err(e) = sink.accept(completion).await {
            tracing::error!(batch = %batch.id(), error = %e, "Sink failed, cancelling batch");
            batch.cancel();
            return Err(e);
        }
    }
    sink.finish().await?;
    Ok(report)
}

/// Drain several batches into one sink, interleaved in completion order.
/// On a sink error every batch is cancelled.
pub async fn pump_all<K, S>(batches: Vec<Batch<K>>, sink: &mut S) -> Result<SinkReport, SinkError>
where
    K: CorrelationKey,
    S: ResultSink<K> + ?Sized,
{
    let tokens: Vec<_> = batches.iter().map(|b| b.cancel_token()).collect();
    let mut merged = futures_util::stream::select_all(batches);
    let mut report = SinkReport::default();
    while let Some(completion) = merged.next().await {
        report.count(&completion);
        if let Err(e) = sink.accept(completion).await {
            tracing::error!(error = %e, "Sink failed, cancelling all batches");
            tokens.iter().for_each(|t| t.cancel());
            return Err(e);
        }
    }
    sink.finish().await?;
    Ok(report)
}
