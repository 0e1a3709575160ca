//! Error types used by the pool, its workers and the supervisor.
//!
//! This module defines two main error enums:
//!
//! - [`PoolError`]: errors raised by the pool and the supervisor around it.
//! - [`WorkerError`]: errors raised by a single worker process.
//!
//! Both types provide helper methods (`as_label`, `is_*`) for logging/metrics.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by a single worker.
///
/// Most of these are expected during normal operation: a worker that has
/// already exited cannot be inspected, which the supervisor treats as
/// "skip this worker this cycle".
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WorkerError {
    /// OS-level metrics for the worker could not be read.
    #[error("resource usage unavailable for pid {pid}: {reason}")]
    ResourceUnavailable {
        /// Process id of the worker.
        pid: u32,
        /// What went wrong while reading.
        reason: String,
    },

    /// The worker process could not be started.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// Delivering a signal to the worker process failed.
    #[error("failed to signal pid {pid}: {reason}")]
    Signal {
        /// Process id of the worker.
        pid: u32,
        /// Underlying OS error.
        reason: String,
    },

    /// Waiting for the worker process to exit failed.
    #[error("failed to wait for pid {pid}: {source}")]
    Wait {
        /// Process id of the worker.
        pid: u32,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The worker was killed but did not exit in time.
    #[error("pid {pid} still running {timeout:?} after kill")]
    Unresponsive {
        /// Process id of the worker.
        pid: u32,
        /// How long the exit was awaited.
        timeout: Duration,
    },
}

impl WorkerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use poolvisor::WorkerError;
    ///
    /// let err = WorkerError::ResourceUnavailable { pid: 7, reason: "gone".into() };
    /// assert_eq!(err.as_label(), "worker_resource_unavailable");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::ResourceUnavailable { .. } => "worker_resource_unavailable",
            WorkerError::Spawn(_) => "worker_spawn",
            WorkerError::Signal { .. } => "worker_signal",
            WorkerError::Wait { .. } => "worker_wait",
            WorkerError::Unresponsive { .. } => "worker_unresponsive",
        }
    }

    /// True for errors that only mean "cannot inspect right now".
    pub fn is_resource_unavailable(&self) -> bool {
        matches!(self, WorkerError::ResourceUnavailable { .. })
    }
}

/// # Errors produced by the pool and its supervisor.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PoolError {
    /// Graceful shutdown exceeded the destroy timeout and forced termination failed too.
    #[error("worker {pid} did not stop within {timeout:?}: {source}")]
    RemovalTimeout {
        /// Process id of the worker being removed.
        pid: u32,
        /// Configured destroy timeout.
        timeout: Duration,
        /// Error returned by the forced termination.
        #[source]
        source: WorkerError,
    },

    /// The factory could not produce a worker.
    #[error("failed to allocate worker: {0}")]
    AllocationFailure(#[source] WorkerError),

    /// No worker became free within the allocate timeout.
    #[error("no free workers within {timeout:?}")]
    NoFreeWorkers {
        /// Configured allocate timeout.
        timeout: Duration,
    },

    /// A unit of work ran longer than the configured exec TTL.
    #[error("worker {pid} exceeded exec ttl {ttl:?}")]
    ExecTtl {
        /// Process id of the worker.
        pid: u32,
        /// Configured exec TTL.
        ttl: Duration,
    },

    /// Policy values are malformed.
    #[error("invalid config: {field}: {reason}")]
    ConfigInvalid {
        /// Name of the offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The pool was destroyed and accepts no further work.
    #[error("pool destroyed")]
    Destroyed,

    /// Worker-level failure surfaced through a pool operation.
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

impl PoolError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use poolvisor::PoolError;
    ///
    /// let err = PoolError::ConfigInvalid { field: "watch_tick", reason: "must be > 0" };
    /// assert_eq!(err.as_label(), "pool_config_invalid");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            PoolError::RemovalTimeout { .. } => "pool_removal_timeout",
            PoolError::AllocationFailure(_) => "pool_allocation_failure",
            PoolError::NoFreeWorkers { .. } => "pool_no_free_workers",
            PoolError::ExecTtl { .. } => "pool_exec_ttl",
            PoolError::ConfigInvalid { .. } => "pool_config_invalid",
            PoolError::Destroyed => "pool_destroyed",
            PoolError::Worker(e) => e.as_label(),
        }
    }

    /// Indicates whether retrying the same call later may succeed.
    ///
    /// Returns `true` for [`PoolError::NoFreeWorkers`] and
    /// [`PoolError::AllocationFailure`].
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PoolError::NoFreeWorkers { .. } | PoolError::AllocationFailure(_)
        )
    }
}
