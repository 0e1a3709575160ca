//! # Worker abstraction.
//!
//! A [`Worker`] is one live OS-level process with an observable [`StateCell`].
//! The pool drives its lifecycle; the supervisor only reads it.
//!
//! # Example
//! ```
//! use async_trait::async_trait;
//! use poolvisor::{ResourceUsage, StateCell, Worker, WorkerError, WorkerState};
//!
//! struct Inline {
//!     state: StateCell,
//! }
//!
//! #[async_trait]
//! impl Worker for Inline {
//!     fn pid(&self) -> u32 { std::process::id() }
//!     fn state(&self) -> &StateCell { &self.state }
//!     fn resource_usage(&self) -> Result<ResourceUsage, WorkerError> {
//!         ResourceUsage::read(self.pid())
//!     }
//!     async fn stop(&self) -> Result<(), WorkerError> { Ok(()) }
//!     async fn kill(&self) -> Result<(), WorkerError> { Ok(()) }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::WorkerError;
use crate::worker::{ResourceUsage, StateCell};

/// Supervised long-lived process.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// Process id (stable for the worker's lifetime).
    fn pid(&self) -> u32;

    /// Shared lifecycle state.
    fn state(&self) -> &StateCell;

    /// Creation timestamp, set once at spawn.
    fn created(&self) -> Instant {
        self.state().created()
    }

    /// Most recent return-to-ready time.
    fn last_used(&self) -> Instant {
        self.state().last_used()
    }

    /// Reads current OS-level usage.
    ///
    /// Fails with [`WorkerError::ResourceUnavailable`] when the process has
    /// exited or cannot be inspected.
    fn resource_usage(&self) -> Result<ResourceUsage, WorkerError>;

    /// Asks the process to exit and waits until it has.
    ///
    /// Callers bound this with their own timeout.
    async fn stop(&self) -> Result<(), WorkerError>;

    /// Terminates the process forcibly and reaps it.
    async fn kill(&self) -> Result<(), WorkerError>;
}

/// Shared handle to a worker.
pub type WorkerRef = Arc<dyn Worker>;
