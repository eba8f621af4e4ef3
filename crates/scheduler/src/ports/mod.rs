//! Collaborators the handlers call out to.
//!
//! Production adapters live in `fleetpay-infra`; the in-memory versions here
//! back tests and local runs.

pub mod entity_store;
pub mod object_storage;
pub mod renderer;

pub use entity_store::{EntityStore, EntityStoreError, InMemoryEntityStore};
pub use object_storage::{InMemoryObjectStorage, ObjectStorage, StorageError, validate_object_path};
pub use renderer::{DocumentRenderer, JsonStatementRenderer, RenderError, STATEMENT_KIND};
