//! Billing domain types referenced by the scheduler.
//!
//! These are snapshots of entities owned by the relational store: cards and
//! their shipping lifecycle, customers, card transactions, and generated
//! statements. Pure deterministic logic only (no IO, no storage).

pub mod card;
pub mod statement;

pub use card::{Card, ShippingStatus};
pub use statement::{
    Customer, GeneratedStatement, STATEMENT_CADENCE_SECS, StatementDocument, StatementLine,
    StatementPeriod, Transaction, total_amount,
};
