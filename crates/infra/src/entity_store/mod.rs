//! Business-entity persistence adapters.

pub mod postgres;

pub use postgres::PostgresEntityStore;
