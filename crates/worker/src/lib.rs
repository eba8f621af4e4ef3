//! Background worker: wires the production adapters into two sweepers.

pub mod app;
pub mod config;

pub use app::{RunningWorker, Worker, build_worker};
pub use config::WorkerConfig;
