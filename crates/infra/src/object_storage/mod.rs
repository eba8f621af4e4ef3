//! Object storage adapters.

pub mod local;

pub use local::LocalObjectStorage;
