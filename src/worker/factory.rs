//! # Worker factories.
//!
//! A [`Factory`] is how a pool obtains workers, both at startup and when
//! replenishing after a removal. Building the command line, environment and
//! stdio is the caller's business; [`ProcessFactory`] only runs what it is given.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::WorkerError;
use crate::worker::{ProcessWorker, Worker, WorkerRef, WorkerState};

/// Produces new workers on demand.
#[async_trait]
pub trait Factory: Send + Sync + 'static {
    /// Creates one worker.
    ///
    /// The returned worker should be `Ready`; a worker left `Inactive` is
    /// promoted by the pool when it joins.
    async fn new_worker(&self, ctx: CancellationToken) -> Result<WorkerRef, WorkerError>;
}

type CommandBuilder = dyn Fn() -> Command + Send + Sync;

/// Factory spawning one OS process per worker from a command builder.
///
/// # Example
/// ```no_run
/// use poolvisor::ProcessFactory;
/// use tokio::process::Command;
///
/// let factory = ProcessFactory::new(|| {
///     let mut cmd = Command::new("php");
///     cmd.arg("worker.php");
///     cmd
/// });
/// ```
#[derive(Clone)]
pub struct ProcessFactory {
    command: Arc<CommandBuilder>,
}

impl ProcessFactory {
    /// Creates a factory calling `command` for every new worker.
    pub fn new<F>(command: F) -> Self
    where
        F: Fn() -> Command + Send + Sync + 'static,
    {
        Self {
            command: Arc::new(command),
        }
    }
}

#[async_trait]
impl Factory for ProcessFactory {
    async fn new_worker(&self, ctx: CancellationToken) -> Result<WorkerRef, WorkerError> {
        if ctx.is_cancelled() {
            return Err(WorkerError::Spawn(std::io::Error::new(
                std::io::ErrorKind::Interrupted,
                "spawn cancelled",
            )));
        }
        let mut cmd = (self.command)();
        let worker = ProcessWorker::spawn(&mut cmd)?;
        // The handshake belongs to the application layer; a live process counts as ready.
        let _ = worker.state().transition(WorkerState::Ready);
        Ok(Arc::new(worker))
    }
}
