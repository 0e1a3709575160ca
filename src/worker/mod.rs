//! # Workers: state model, process handle and factory.
//!
//! This module provides the worker-related types:
//! - [`WorkerState`] / [`StateCell`] - lifecycle state shared by allocator, pool and supervisor
//! - [`Worker`] - trait for a supervised long-lived process
//! - [`WorkerRef`] - shared reference to a worker (`Arc<dyn Worker>`)
//! - [`ResourceUsage`] - point-in-time OS metrics of a worker process
//! - [`ProcessWorker`] - [`Worker`] backed by a `tokio::process::Child`
//! - [`Factory`] / [`ProcessFactory`] - how pools obtain new workers

mod factory;
mod handle;
mod process;
mod state;
mod usage;

pub use factory::{Factory, ProcessFactory};
pub use handle::{Worker, WorkerRef};
pub use process::ProcessWorker;
pub use state::{StateCell, WorkerState};
pub use usage::{MB, ResourceUsage};
