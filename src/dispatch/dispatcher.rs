//! Batch driver and per-attempt tasks.

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{DispatchConfig, EngineConfig};
use crate::dispatch::batch::{Batch, Completion};
use crate::dispatch::request::{CorrelationKey, LogicalRequest, RequestState};
use crate::dispatch::tracker::Tracker;
use crate::error::FetchError;
use crate::governor::{Governor, Permit, Signal};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::observability::stats::FetchStats;
use crate::resilience::{
    calculate_backoff, Classifier, Judgement, Outcome, Payload, RetryPolicy, TransientFailure,
};
use crate::transport::{Target, Transport, TransportError};

/// Multiplexes batches of logical requests over a governed transport.
pub struct Dispatcher<T> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    transport: T,
    governor: Arc<Governor>,
    classifier: Classifier,
    call_timeout: Duration,
    dispatch: DispatchConfig,
    stats: Arc<FetchStats>,
}

/// State shared by the driver and attempt tasks of one batch.
struct BatchContext<K: CorrelationKey> {
    id: Uuid,
    tracker: Arc<Tracker<K>>,
    results: mpsc::Sender<Completion<K>>,
    retries: mpsc::UnboundedSender<LogicalRequest<K>>,
    cancel: CancellationToken,
}

impl<T: Transport> Dispatcher<T> {
    /// Dispatcher with its own governor built from `config`.
    pub fn new(transport: T, config: &EngineConfig) -> Self {
        let governor = Arc::new(Governor::new(config.governor.clone()));
        Self::with_governor(transport, governor, config)
    }

    /// Dispatcher sharing an existing governor, e.g. one per API host.
    pub fn with_governor(transport: T, governor: Arc<Governor>, config: &EngineConfig) -> Self {
        let classifier = Classifier::new(RetryPolicy::from(&config.retry));
        Self::from_parts(transport, governor, classifier, config)
    }

    /// Dispatcher with a caller-built classifier (for payload inspection).
    pub fn from_parts(
        transport: T,
        governor: Arc<Governor>,
        classifier: Classifier,
        config: &EngineConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                governor,
                classifier,
                call_timeout: config.transport.timeout(),
                dispatch: config.dispatch.clone(),
                stats: Arc::new(FetchStats::new()),
            }),
        }
    }

    pub fn governor(&self) -> &Arc<Governor> {
        &self.shared.governor
    }

    pub fn stats(&self) -> &Arc<FetchStats> {
        &self.shared.stats
    }

    /// Submit a batch. Requests are pulled lazily from `requests` as budget
    /// frees up, so the iterator may be arbitrarily long.
    ///
    /// Must be called within a tokio runtime.
    pub fn submit<K, I>(&self, requests: I) -> Batch<K>
    where
        K: CorrelationKey,
        I: IntoIterator<Item = (K, Target)>,
        I::IntoIter: Send + 'static,
    {
        self.spawn_batch(requests.into_iter(), CancellationToken::new())
    }

    /// Submit a batch that is also cancelled when `shutdown` triggers.
    pub fn submit_with_shutdown<K, I>(&self, requests: I, shutdown: &Shutdown) -> Batch<K>
    where
        K: CorrelationKey,
        I: IntoIterator<Item = (K, Target)>,
        I::IntoIter: Send + 'static,
    {
        self.spawn_batch(requests.into_iter(), shutdown.subscribe())
    }

    fn spawn_batch<K, I>(&self, source: I, cancel: CancellationToken) -> Batch<K>
    where
        K: CorrelationKey,
        I: Iterator<Item = (K, Target)> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let (results_tx, results_rx) = mpsc::channel(self.shared.dispatch.output_buffer.max(1));
        let (retries_tx, retries_rx) = mpsc::unbounded_channel();
        let tracker = Arc::new(Tracker::new());

        let ctx = Arc::new(BatchContext {
            id,
            tracker: Arc::clone(&tracker),
            results: results_tx,
            retries: retries_tx,
            cancel: cancel.clone(),
        });

        let span = tracing::info_span!("batch", id = %id, governor = %self.shared.governor.name());
        tokio::spawn(Arc::clone(&self.shared).drive(ctx, source, retries_rx).instrument(span));

        Batch::new(id, results_rx, cancel, tracker)
    }
}

impl<T: Transport> Shared<T> {
    fn name(&self) -> &str {
        self.governor.name()
    }

    async fn drive<K, I>(
        self: Arc<Self>,
        ctx: Arc<BatchContext<K>>,
        source: I,
        mut retries: mpsc::UnboundedReceiver<LogicalRequest<K>>,
    ) where
        K: CorrelationKey,
        I: Iterator<Item = (K, Target)>,
    {
        let mut source = source.fuse();
        let mut seen = KeyFilter::new(self.dispatch.reject_duplicate_keys);
        let mut exhausted = false;

        tracing::debug!("Batch started");

        loop {
            if ctx.cancel.is_cancelled() {
                break;
            }

            let request = match retries.try_recv() {
                Ok(request) => request,
                Err(_) => {
                    let room = ctx.tracker.len() < self.dispatch.max_outstanding.max(1);
                    let admitted = if room && !exhausted {
                        self.admit_next(&ctx, &mut source, &mut seen, &mut exhausted)
                    } else {
                        None
                    };

                    match admitted {
                        Some(request) => request,
                        None if exhausted && ctx.tracker.is_empty() => break,
                        None => {
                            tokio::select! {
                                Some(request) = retries.recv() => request,
                                _ = ctx.tracker.settled() => continue,
                                _ = ctx.cancel.cancelled() => break,
                            }
                        }
                    }
                }
            };

            let permit = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    self.complete(&ctx, request, Err(FetchError::Cancelled)).await;
                    break;
                }
                permit = self.governor.acquire() => permit,
            };

            ctx.tracker.set(request.key(), RequestState::InFlight);
            tokio::spawn(
                Arc::clone(&self)
                    .attempt(Arc::clone(&ctx), request, permit)
                    .in_current_span(),
            );
        }

        if ctx.cancel.is_cancelled() {
            self.wind_down(&ctx, source, &mut seen, &mut retries).await;
        }

        tracing::debug!(stats = %self.stats.summary(), "Batch finished");
    }

    /// Pull the next admissible request from the source, skipping duplicates.
    fn admit_next<K, I>(
        &self,
        ctx: &BatchContext<K>,
        source: &mut I,
        seen: &mut KeyFilter<K>,
        exhausted: &mut bool,
    ) -> Option<LogicalRequest<K>>
    where
        K: CorrelationKey,
        I: Iterator<Item = (K, Target)>,
    {
        for (key, target) in source.by_ref() {
            if !seen.insert(&key) || !ctx.tracker.admit(key.clone()) {
                tracing::warn!(key = ?key, "Duplicate correlation key in batch, ignoring");
                self.stats.record_rejected();
                continue;
            }
            return Some(LogicalRequest::new(key, target));
        }
        *exhausted = true;
        None
    }

    /// Resolve everything still outstanding after cancellation.
    async fn wind_down<K, I>(
        &self,
        ctx: &BatchContext<K>,
        source: I,
        seen: &mut KeyFilter<K>,
        retries: &mut mpsc::UnboundedReceiver<LogicalRequest<K>>,
    ) where
        K: CorrelationKey,
        I: Iterator<Item = (K, Target)>,
    {
        tracing::info!(outstanding = ctx.tracker.len(), "Batch cancelled");

        for (key, _) in source {
            if !seen.insert(&key) || ctx.tracker.state(&key).is_some() {
                self.stats.record_rejected();
                continue;
            }
            self.stats.record_cancelled();
            self.emit(ctx, Completion {
                key,
                attempts: 0,
                outcome: Err(FetchError::Cancelled),
                elapsed: Duration::ZERO,
            })
            .await;
        }

        // in-flight attempts complete on their own; queued retries end here
        while !ctx.tracker.is_empty() {
            tokio::select! {
                Some(request) = retries.recv() => {
                    self.complete(ctx, request, Err(FetchError::Cancelled)).await;
                }
                _ = ctx.tracker.settled() => {}
            }
        }
    }

    async fn attempt<K: CorrelationKey>(
        self: Arc<Self>,
        ctx: Arc<BatchContext<K>>,
        mut request: LogicalRequest<K>,
        permit: Permit,
    ) {
        let attempt = request.begin_attempt();
        self.stats.record_attempt();

        // a panicking transport or inspector must still settle the request
        let judged = AssertUnwindSafe(self.judge_attempt(request.target(), attempt))
            .catch_unwind()
            .await;
        let judgement = judged.unwrap_or_else(|panic| {
            let message = panic_message(panic.as_ref());
            tracing::error!(key = ?request.key(), attempt, error = %message, "Attempt panicked");
            Judgement {
                outcome: Outcome::Fatal(FetchError::Internal(message)),
                signal: Signal::Neutral,
            }
        });
        if judgement.signal == Signal::Throttled {
            self.stats.record_throttled();
        }
        self.governor.release(permit, judgement.signal);

        match judgement.outcome {
            Outcome::Success(payload) => self.complete(&ctx, request, Ok(payload)).await,
            Outcome::Fatal(err) => self.complete(&ctx, request, Err(err)).await,
            Outcome::Transient(failure) => self.retry_later(&ctx, request, failure).await,
        }
    }

    async fn judge_attempt(&self, target: &Target, attempt: u32) -> Judgement {
        let result = match tokio::time::timeout(self.call_timeout, self.transport.execute(target)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.call_timeout)),
        };
        metrics::record_attempt(self.name(), result.as_ref().ok().map(|e| e.status));
        self.classifier.judge(result, attempt)
    }

    async fn retry_later<K: CorrelationKey>(
        &self,
        ctx: &BatchContext<K>,
        request: LogicalRequest<K>,
        failure: TransientFailure,
    ) {
        if ctx.cancel.is_cancelled() {
            self.complete(ctx, request, Err(FetchError::Cancelled)).await;
            return;
        }

        let delay = calculate_backoff(
            self.classifier.policy(),
            request.attempt_count(),
            failure.retry_after,
        );
        ctx.tracker.set(request.key(), RequestState::Retrying);
        self.stats.record_retry();
        metrics::record_retry(self.name());
        tracing::debug!(
            key = ?request.key(),
            attempt = request.attempt_count(),
            delay_ms = delay.as_millis() as u64,
            reason = %failure.reason,
            "Retrying request"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = ctx.cancel.cancelled() => {
                self.complete(ctx, request, Err(FetchError::Cancelled)).await;
                return;
            }
        }

        if let Err(mpsc::error::SendError(request)) = ctx.retries.send(request) {
            self.complete(ctx, request, Err(FetchError::Cancelled)).await;
        }
    }

    async fn complete<K: CorrelationKey>(
        &self,
        ctx: &BatchContext<K>,
        request: LogicalRequest<K>,
        outcome: Result<Payload, FetchError>,
    ) {
        let label = match &outcome {
            Ok(_) => {
                self.stats.record_success();
                "success"
            }
            Err(FetchError::Cancelled) => {
                self.stats.record_cancelled();
                "cancelled"
            }
            Err(err) => {
                self.stats.record_failure();
                tracing::warn!(key = ?request.key(), attempts = request.attempt_count(), error = %err, "Request failed");
                err.kind()
            }
        };
        metrics::record_completion(self.name(), label, request.created_at());

        let key = request.key().clone();
        let completion = Completion {
            key: key.clone(),
            attempts: request.attempt_count(),
            elapsed: request.age(),
            outcome,
        };
        self.emit(ctx, completion).await;
        ctx.tracker.finish(&key);
    }

    async fn emit<K: CorrelationKey>(&self, ctx: &BatchContext<K>, completion: Completion<K>) {
        if ctx.results.send(completion).await.is_err() {
            tracing::trace!(batch = %ctx.id, "Completion receiver dropped");
        }
    }
}

/// Keys already admitted to a batch, when duplicates are rejected.
struct KeyFilter<K> {
    seen: Option<HashSet<K>>,
}

impl<K: CorrelationKey> KeyFilter<K> {
    fn new(reject_duplicates: bool) -> Self {
        Self {
            seen: reject_duplicates.then(HashSet::new),
        }
    }

    /// False if `key` was seen before and duplicates are rejected.
    fn insert(&mut self, key: &K) -> bool {
        match &mut self.seen {
            Some(seen) => seen.insert(key.clone()),
            None => true,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "attempt panicked".to_string()
    }
}

impl<T> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("governor", &self.shared.governor)
            .field("classifier", &self.shared.classifier)
            .field("call_timeout", &self.shared.call_timeout)
            .finish()
    }
}
