//! A queue paired with its metadata store.

use std::sync::Arc;

use crate::metadata::{EntryMetadataStore, FieldMap};
use crate::queue::{QueueError, TimeIndexedQueue};

/// One logical job queue: the time index plus per-key fields.
///
/// Write ordering matters because the two stores are not updated atomically:
/// a first schedule writes fields before the queue entry (a key is never due
/// without its fields), while a reschedule moves the score first (a crash
/// between the two writes re-runs the old window instead of skipping one).
#[derive(Clone)]
pub struct JobQueue {
    queue: Arc<dyn TimeIndexedQueue>,
    metadata: Arc<dyn EntryMetadataStore>,
}

impl JobQueue {
    pub fn new(queue: Arc<dyn TimeIndexedQueue>, metadata: Arc<dyn EntryMetadataStore>) -> Self {
        Self { queue, metadata }
    }

    pub fn queue(&self) -> &Arc<dyn TimeIndexedQueue> {
        &self.queue
    }

    pub fn metadata(&self) -> &Arc<dyn EntryMetadataStore> {
        &self.metadata
    }

    /// Initial schedule of `key` at `score`.
    pub async fn schedule(&self, key: &str, score: i64, fields: &FieldMap) -> Result<(), QueueError> {
        if !fields.is_empty() {
            self.metadata.set_fields(key, fields).await?;
        }
        self.queue.enqueue_or_update(key, score).await
    }

    /// Move `key` to `score` and merge `fields`.
    ///
    /// If the score write lands and the field write fails, the key sits at the
    /// new score with the old fields. For statements that means the old period
    /// is generated a second time when the new score comes due.
    pub async fn reschedule(
        &self,
        key: &str,
        score: i64,
        fields: &FieldMap,
    ) -> Result<(), QueueError> {
        self.queue.enqueue_or_update(key, score).await?;
        if !fields.is_empty() {
            self.metadata.set_fields(key, fields).await?;
        }
        Ok(())
    }

    /// Drop `key` and its fields. Returns whether the key was queued.
    pub async fn complete(&self, key: &str) -> Result<bool, QueueError> {
        let removed = self.queue.remove(key).await?;
        self.metadata.delete(key).await?;
        Ok(removed)
    }

    pub async fn fields(&self, key: &str) -> Result<FieldMap, QueueError> {
        self.metadata.get_fields(key).await
    }

    pub async fn contains(&self, key: &str) -> Result<bool, QueueError> {
        self.queue.contains(key).await
    }

    pub async fn score(&self, key: &str) -> Result<Option<i64>, QueueError> {
        self.queue.score(key).await
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue").finish_non_exhaustive()
    }
}
