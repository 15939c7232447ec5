//! Caller-side handle of a submitted batch.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::dispatch::request::CorrelationKey;
use crate::dispatch::tracker::{BatchProgress, Tracker};
use crate::error::FetchError;
use crate::resilience::Payload;

/// Terminal result for one submitted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion<K> {
    pub key: K,
    /// Attempts issued for this request; 0 if it never reached the transport.
    pub attempts: u32,
    pub outcome: Result<Payload, FetchError>,
    /// Time from admission to completion.
    pub elapsed: Duration,
}

impl<K> Completion<K> {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, Err(FetchError::Cancelled))
    }
}

/// Stream of completions in completion order.
///
/// Dropping the handle cancels the batch.
pub struct Batch<K: CorrelationKey> {
    id: Uuid,
    results: mpsc::Receiver<Completion<K>>,
    cancel: CancellationToken,
    tracker: Arc<Tracker<K>>,
}

impl<K: CorrelationKey> Batch<K> {
    pub(crate) fn new(
        id: Uuid,
        results: mpsc::Receiver<Completion<K>>,
        cancel: CancellationToken,
        tracker: Arc<Tracker<K>>,
    ) -> Self {
        Self {
            id,
            results,
            cancel,
            tracker,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next completion, or `None` once every request has completed.
    pub async fn next(&mut self) -> Option<Completion<K>> {
        self.results.recv().await
    }

    /// Stop issuing new attempts; remaining requests complete as cancelled.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token cancelling this batch, for handing to other tasks.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Admitted requests that have not completed yet.
    pub fn progress(&self) -> BatchProgress {
        self.tracker.progress()
    }

    /// Wait for every completion.
    pub async fn collect(mut self) -> Vec<Completion<K>> {
        let mut completions = Vec::new();
        while let Some(completion) = self.next().await {
            completions.push(completion);
        }
        completions
    }
}

impl<K: CorrelationKey> Stream for Batch<K> {
    type Item = Completion<K>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().results.poll_recv(cx)
    }
}

impl<K: CorrelationKey> Drop for Batch<K> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<K: CorrelationKey> std::fmt::Debug for Batch<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch")
            .field("id", &self.id)
            .field("progress", &self.progress())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
