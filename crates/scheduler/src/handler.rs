//! Job handler contract used by the sweeper.

use std::time::Duration;

use async_trait::async_trait;

use fleetpay_core::DomainError;

use crate::metadata::FieldMap;
use crate::ports::{EntityStoreError, RenderError, StorageError};
use crate::queue::QueueError;

/// What the sweeper does with a key after its handler succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    /// Remove the key and its fields.
    OneShot,
    /// Leave the key alone; the handler has already rescheduled it.
    Recurring,
}

/// A due key handed to a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueEntry {
    pub key: String,
    /// Fields stored for the key at the time it was picked up.
    pub fields: FieldMap,
    /// Instant of the sweep, Unix seconds.
    pub now: i64,
}

/// Handler failure.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    EntityStore(#[from] EntityStoreError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("handler timed out after {0:?}")]
    Timeout(Duration),
}

impl JobError {
    /// Queue/metadata failures abort the sweep; everything else is per key.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, JobError::Queue(_))
    }
}

/// Processes one due key.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &'static str;

    fn recurrence(&self) -> Recurrence;

    async fn process(&self, entry: &DueEntry) -> Result<(), JobError>;
}
