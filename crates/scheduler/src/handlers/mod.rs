//! Concrete job handlers.

pub mod delivery;
pub mod statement;

pub use delivery::DeliveryStatusHandler;
pub use statement::{StatementGenerationHandler, statement_object_path};
