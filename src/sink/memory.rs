//! In-memory sink.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::dispatch::{Completion, CorrelationKey};
use crate::sink::{ResultSink, SinkError};

/// Collects completions, keyed for lookup.
#[derive(Debug)]
pub struct MemorySink<K: CorrelationKey> {
    completions: HashMap<K, Completion<K>>,
    finished: bool,
}

impl<K: CorrelationKey> MemorySink<K> {
    pub fn new() -> Self {
        Self {
            completions: HashMap::new(),
            finished: false,
        }
    }

    pub fn get(&self, key: &K) -> Option<&Completion<K>> {
        self.completions.get(key)
    }

    pub fn len(&self) -> usize {
        self.completions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completions.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn into_inner(self) -> HashMap<K, Completion<K>> {
        self.completions
    }
}

impl<K: CorrelationKey> Default for MemorySink<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K: CorrelationKey> ResultSink<K> for MemorySink<K> {
    async fn accept(&mut self, completion: Completion<K>) -> Result<(), SinkError> {
        let key = completion.key.clone();
        if self.completions.insert(key.clone(), completion).is_some() {
            return Err(SinkError::Rejected(format!("duplicate completion for {:?}", key)));
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), SinkError> {
        self.finished = true;
        Ok(())
    }
}
