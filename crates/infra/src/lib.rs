//! Infrastructure layer: Redis queues, Postgres entities, object storage.
//!
//! Every adapter implements a port from `fleetpay-scheduler`; nothing here
//! knows about sweeps or handlers.

pub mod entity_store;
pub mod object_storage;
pub mod queue;

pub use entity_store::PostgresEntityStore;
pub use object_storage::LocalObjectStorage;
pub use queue::{CARD_DELIVERY_NAMESPACE, STATEMENT_NAMESPACE};

#[cfg(feature = "redis")]
pub use queue::{RedisMetadataStore, RedisTimeIndexedQueue};
