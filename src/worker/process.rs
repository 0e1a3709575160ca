//! # Process-backed worker.
//!
//! [`ProcessWorker`] wraps a `tokio::process::Child`:
//! - graceful stop: `SIGTERM`, then wait for exit (unix; elsewhere it is a kill);
//! - forced stop: `SIGKILL` via [`tokio::process::Child::start_kill`], then reap;
//! - usage: read from `/proc` by [`ResourceUsage::read`].

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::error::WorkerError;
use crate::worker::{ResourceUsage, StateCell, Worker, WorkerState};

/// Worker backed by an OS child process.
pub struct ProcessWorker {
    pid: u32,
    child: Mutex<Child>,
    state: StateCell,
}

impl ProcessWorker {
    /// Adopts an already spawned child. The worker starts `Inactive`.
    pub fn from_child(child: Child) -> Result<Self, WorkerError> {
        let pid = child.id().ok_or_else(|| {
            WorkerError::Spawn(std::io::Error::other("child exited before it was adopted"))
        })?;
        Ok(Self {
            pid,
            child: Mutex::new(child),
            state: StateCell::new(WorkerState::Inactive),
        })
    }

    /// Spawns `cmd` and adopts the child.
    pub fn spawn(cmd: &mut Command) -> Result<Self, WorkerError> {
        let child = cmd.kill_on_drop(true).spawn().map_err(WorkerError::Spawn)?;
        let worker = Self::from_child(child)?;
        tracing::debug!(pid = worker.pid, "spawned worker process");
        Ok(worker)
    }

    /// True once the child has exited (and was reaped).
    pub async fn has_exited(&self) -> bool {
        let mut child = self.child.lock().await;
        !matches!(child.try_wait(), Ok(None))
    }

    async fn wait(&self, child: &mut Child) -> Result<(), WorkerError> {
        let status = child.wait().await.map_err(|source| WorkerError::Wait {
            pid: self.pid,
            source,
        })?;
        tracing::debug!(pid = self.pid, %status, "worker process exited");
        Ok(())
    }
}

#[async_trait]
impl Worker for ProcessWorker {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn state(&self) -> &StateCell {
        &self.state
    }

    fn resource_usage(&self) -> Result<ResourceUsage, WorkerError> {
        ResourceUsage::read(self.pid)
    }

    #[cfg(unix)]
    async fn stop(&self) -> Result<(), WorkerError> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let mut child = self.child.lock().await;
        if let Ok(Some(_)) = child.try_wait() {
            return Ok(());
        }
        let pid = i32::try_from(self.pid).map_err(|e| WorkerError::Signal {
            pid: self.pid,
            reason: e.to_string(),
        })?;
        kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(|e| WorkerError::Signal {
            pid: self.pid,
            reason: e.to_string(),
        })?;
        self.wait(&mut child).await
    }

    #[cfg(not(unix))]
    async fn stop(&self) -> Result<(), WorkerError> {
        self.kill().await
    }

    async fn kill(&self) -> Result<(), WorkerError> {
        let mut child = self.child.lock().await;
        if let Ok(Some(_)) = child.try_wait() {
            return Ok(());
        }
        child.start_kill().map_err(|e| WorkerError::Signal {
            pid: self.pid,
            reason: e.to_string(),
        })?;
        self.wait(&mut child).await
    }
}
