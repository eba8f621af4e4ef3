//! `fleetpay-core` — foundation building blocks shared by every crate.
//!
//! This crate contains **pure** primitives (no infrastructure concerns):
//! strongly-typed identifiers and the domain error model.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{CardId, CustomerId, StatementId, TransactionId};
