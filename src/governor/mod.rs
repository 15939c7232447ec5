//! Rate governor subsystem.
//!
//! # Data Flow
//! ```text
//! acquire():
//!     → concurrency slot (semaphore, max_concurrency)
//!     → issuance gate (FIFO) → token bucket refilled at current_rate
//!     → Permit
//!
//! release(permit, signal):
//!     → slot returned
//!     → state.rs adjusts current_rate (AIMD)
//! ```
//!
//! # Design Decisions
//! - One governor per API host, passed explicitly as `Arc<Governor>`
//! - RateState is only mutated inside `acquire` and `release`
//! - A permit is consumed by `release`; dropping it releases with `Signal::Neutral`

pub mod state;
pub mod token_bucket;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::GovernorConfig;
use crate::observability::metrics;

pub use state::{RateChange, RateState, Signal};
use token_bucket::TokenBucket;

struct Inner {
    state: RateState,
    bucket: TokenBucket,
}

/// Grants permission to issue requests within a concurrency and rate budget.
pub struct Governor {
    name: String,
    config: GovernorConfig,
    slots: Arc<Semaphore>,
    gate: tokio::sync::Mutex<()>,
    inner: Mutex<Inner>,
}

impl Governor {
    pub fn new(config: GovernorConfig) -> Self {
        Self::named("default", config)
    }

    /// Create a governor whose logs and metrics carry `name` (usually the API host).
    ///
    /// Out-of-range settings are pulled back into range with a warning.
    pub fn named(name: impl Into<String>, mut config: GovernorConfig) -> Self {
        let name = name.into();
        let adjusted = config.sanitize();
        if !adjusted.is_empty() {
            tracing::warn!(governor = %name, fields = ?adjusted, "Governor config out of range, adjusted");
        }
        let state = RateState::new(&config);
        let bucket = TokenBucket::new(config.burst);
        Self {
            name,
            slots: Arc::new(Semaphore::new(config.max_concurrency)),
            gate: tokio::sync::Mutex::new(()),
            inner: Mutex::new(Inner { state, bucket }),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("governor mutex poisoned")
    }

    /// Wait for a concurrency slot and a rate token.
    ///
    /// Cancel-safe: dropping the future before it resolves gives back
    /// anything taken so far.
    pub async fn acquire(self: &Arc<Self>) -> Permit {
        let slot = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .expect("governor semaphore is never closed");

        let _gate = self.gate.lock().await;
        loop {
            let wait = {
                let mut guard = self.lock();
                let inner = &mut *guard;
                match inner.bucket.try_acquire(self.config.burst, inner.state.current_rate) {
                    Ok(()) => {
                        inner.state.in_flight += 1;
                        metrics::record_in_flight(&self.name, inner.state.in_flight);
                        break;
                    }
                    Err(wait) => wait,
                }
            };
            tokio::time::sleep(wait).await;
        }

        Permit {
            governor: Arc::clone(self),
            slot: Some(slot),
            issued_at: Instant::now(),
        }
    }

    /// Return a permit and report how the server responded.
    pub fn release(&self, mut permit: Permit, signal: Signal) {
        debug_assert!(
            std::ptr::eq(self, Arc::as_ptr(&permit.governor)),
            "permit released to a foreign governor"
        );
        if let Some(slot) = permit.slot.take() {
            permit.governor.settle(signal);
            drop(slot);
        }
    }

    fn settle(&self, signal: Signal) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.state.in_flight = inner.state.in_flight.saturating_sub(1);
        metrics::record_in_flight(&self.name, inner.state.in_flight);

        match inner.state.apply(signal, &self.config) {
            Some(RateChange::Decreased { from, to }) => {
                tracing::info!(governor = %self.name, from, to, "Throttled, lowering request rate");
                metrics::record_rate(&self.name, to);
            }
            Some(RateChange::Increased { from, to }) => {
                tracing::debug!(governor = %self.name, from, to, "Raising request rate");
                metrics::record_rate(&self.name, to);
            }
            None => {}
        }

        if signal == Signal::Throttled && inner.state.should_alert_floor(&self.config) {
            tracing::warn!(
                governor = %self.name,
                rate = inner.state.current_rate,
                consecutive = inner.state.consecutive_throttle_signals,
                "Sustained throttling at minimum rate"
            );
            metrics::record_throttle_floor(&self.name);
        }
    }

    /// Copy of the current rate state.
    pub fn snapshot(&self) -> RateState {
        self.lock().state
    }

    pub fn current_rate(&self) -> f64 {
        self.lock().state.current_rate
    }

    /// Concurrency slots not currently held.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}

impl std::fmt::Debug for Governor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Governor")
            .field("name", &self.name)
            .field("state", &self.snapshot())
            .finish()
    }
}

/// Right to issue exactly one request.
pub struct Permit {
    governor: Arc<Governor>,
    slot: Option<OwnedSemaphorePermit>,
    issued_at: Instant,
}

impl Permit {
    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }
}

impl std::fmt::Debug for Permit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permit")
            .field("governor", &self.governor.name)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if self.slot.take().is_some() {
            self.governor.settle(Signal::Neutral);
        }
    }
}
