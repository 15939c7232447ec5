//! Per-batch bookkeeping of admitted requests.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Notify;

use crate::dispatch::request::{CorrelationKey, RequestState};

/// Counts of tracked requests by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchProgress {
    pub pending: usize,
    pub in_flight: usize,
    pub retrying: usize,
}

impl BatchProgress {
    pub fn outstanding(&self) -> usize {
        self.pending + self.in_flight + self.retrying
    }
}

/// Admitted-but-unfinished requests of one batch.
#[derive(Debug)]
pub struct Tracker<K: CorrelationKey> {
    states: DashMap<K, RequestState>,
    settled: Notify,
}

impl<K: CorrelationKey> Tracker<K> {
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
            settled: Notify::new(),
        }
    }

    /// Start tracking `key` as pending. False if it is already tracked.
    pub fn admit(&self, key: K) -> bool {
        match self.states.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(RequestState::Pending);
                true
            }
        }
    }

    pub fn set(&self, key: &K, state: RequestState) {
        if let Some(mut entry) = self.states.get_mut(key) {
            *entry = state;
        }
    }

    pub fn state(&self, key: &K) -> Option<RequestState> {
        self.states.get(key).map(|entry| *entry)
    }

    /// Stop tracking `key` and wake the batch driver.
    pub fn finish(&self, key: &K) {
        self.states.remove(key);
        self.settled.notify_one();
    }

    /// Resolves after some request finished since the last call.
    pub async fn settled(&self) {
        self.settled.notified().await
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn progress(&self) -> BatchProgress {
        let mut progress = BatchProgress::default();
        for entry in self.states.iter() {
            match *entry.value() {
                RequestState::Pending => progress.pending += 1,
                RequestState::InFlight => progress.in_flight += 1,
                RequestState::Retrying => progress.retrying += 1,
            }
        }
        progress
    }
}

impl<K: CorrelationKey> Default for Tracker<K> {
    fn default() -> Self {
        Self::new()
    }
}
