//! Score-ordered queue of opaque keys.
//!
//! The score is the Unix second at which the key becomes due. A key appears at
//! most once: re-inserting overwrites its score (last write wins).

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

/// Queue backend failure.
///
/// Always an infrastructure problem (backend down, protocol error); the queue
/// has no domain-level failure modes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("queue backend unavailable: {0}")]
    Unavailable(String),
    #[error("queue storage error: {0}")]
    Storage(String),
}

/// Time-indexed queue abstraction.
#[async_trait]
pub trait TimeIndexedQueue: Send + Sync {
    /// Insert `key` with `score`, or move an existing key to `score`.
    ///
    /// Idempotent. A re-insert counts as a fresh insertion for tie ordering.
    async fn enqueue_or_update(&self, key: &str, score: i64) -> Result<(), QueueError>;

    /// Remove `key`. Returns `true` if it was present.
    async fn remove(&self, key: &str) -> Result<bool, QueueError>;

    /// Keys with `min <= score <= max`, ascending by score, ties in insertion order.
    async fn range_by_score(&self, min: i64, max: i64) -> Result<Vec<String>, QueueError>;

    async fn contains(&self, key: &str) -> Result<bool, QueueError>;

    /// Current score of `key`, if queued.
    async fn score(&self, key: &str) -> Result<Option<i64>, QueueError>;

    /// Number of queued keys.
    async fn len(&self) -> Result<usize, QueueError>;
}

#[derive(Debug, Default)]
struct QueueState {
    /// key -> (score, insertion sequence)
    by_key: HashMap<String, (i64, u64)>,
    /// (score, insertion sequence) -> key
    ordered: BTreeMap<(i64, u64), String>,
    next_seq: u64,
}

/// In-memory queue for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryTimeIndexedQueue {
    state: RwLock<QueueState>,
}

impl InMemoryTimeIndexedQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TimeIndexedQueue for InMemoryTimeIndexedQueue {
    async fn enqueue_or_update(&self, key: &str, score: i64) -> Result<(), QueueError> {
        let mut state = self.state.write().expect("queue lock poisoned");
        let seq = state.next_seq;
        state.next_seq += 1;

        if let Some(previous) = state.by_key.insert(key.to_string(), (score, seq)) {
            state.ordered.remove(&previous);
        }
        state.ordered.insert((score, seq), key.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, QueueError> {
        let mut state = self.state.write().expect("queue lock poisoned");
        match state.by_key.remove(key) {
            Some(position) => {
                state.ordered.remove(&position);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn range_by_score(&self, min: i64, max: i64) -> Result<Vec<String>, QueueError> {
        if min > max {
            return Ok(Vec::new());
        }
        let state = self.state.read().expect("queue lock poisoned");
        Ok(state
            .ordered
            .range((min, 0)..=(max, u64::MAX))
            .map(|(_, key)| key.clone())
            .collect())
    }

    async fn contains(&self, key: &str) -> Result<bool, QueueError> {
        let state = self.state.read().expect("queue lock poisoned");
        Ok(state.by_key.contains_key(key))
    }

    async fn score(&self, key: &str) -> Result<Option<i64>, QueueError> {
        let state = self.state.read().expect("queue lock poisoned");
        Ok(state.by_key.get(key).map(|(score, _)| *score))
    }

    async fn len(&self) -> Result<usize, QueueError> {
        let state = self.state.read().expect("queue lock poisoned");
        Ok(state.by_key.len())
    }
}
