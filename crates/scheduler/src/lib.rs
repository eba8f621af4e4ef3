//! `fleetpay-scheduler`
//!
//! **Responsibility:** time-indexed deferred work.
//!
//! - A score-ordered queue (`key -> due unix seconds`) plus a per-key field map.
//! - A [`Sweeper`] that, once per tick, picks every key due within
//!   `[now - tolerance, now + tolerance]` and hands it to a [`JobHandler`].
//! - Two handlers: card delivery (one-shot) and statement generation (recurring).
//!
//! Delivery is at-least-once. A failing key stays queued and is retried on the
//! next tick; there is no backoff and no dead-letter queue.

pub mod clock;
pub mod handler;
pub mod handlers;
pub mod metadata;
pub mod ports;
pub mod queue;
pub mod schedule;
pub mod service;
pub mod sweeper;

pub use clock::{Clock, FixedClock, SystemClock};
pub use handler::{DueEntry, JobError, JobHandler, Recurrence};
pub use handlers::{DeliveryStatusHandler, StatementGenerationHandler};
pub use metadata::{EntryMetadataStore, FieldMap, InMemoryMetadataStore, StatementWindow};
pub use ports::{
    DocumentRenderer, EntityStore, EntityStoreError, InMemoryEntityStore, InMemoryObjectStorage,
    JsonStatementRenderer, ObjectStorage, RenderError, StorageError,
};
pub use queue::{InMemoryTimeIndexedQueue, QueueError, TimeIndexedQueue};
pub use schedule::JobQueue;
pub use service::{ScheduleError, SchedulingService};
pub use sweeper::{
    SweepError, SweepReport, SweepWindow, Sweeper, SweeperConfig, SweeperHandle, SweeperStats,
};
