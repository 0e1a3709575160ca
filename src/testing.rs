//! In-memory workers and factory for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, broadcast};
use tokio_util::sync::CancellationToken;

use crate::core::{Pool, Removal};
use crate::error::{PoolError, WorkerError};
use crate::events::{Event, EventKind};
use crate::worker::{Factory, MB, ResourceUsage, StateCell, Worker, WorkerRef, WorkerState};

/// Everything currently buffered in `rx`.
pub fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

pub fn count(events: &[Event], kind: EventKind) -> usize {
    events.iter().filter(|e| e.kind == kind).count()
}

/// How a fake worker reacts to `stop`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopMode {
    /// Exits immediately.
    Clean,
    /// Never exits on its own.
    Hang,
    /// Waits until `FakeWorker::release_stop` is called.
    Gated,
}

pub struct FakeWorker {
    pid: u32,
    state: StateCell,
    memory_mb: AtomicU64,
    usage_fails: AtomicBool,
    stop_mode: Mutex<StopMode>,
    kill_fails: AtomicBool,
    kill_hangs: AtomicBool,
    stop_gate: Notify,
    pub stop_entered: Notify,
    pub stops: AtomicUsize,
    pub kills: AtomicUsize,
}

impl FakeWorker {
    pub fn new(pid: u32, state: WorkerState) -> Arc<Self> {
        Arc::new(Self {
            pid,
            state: StateCell::new(state),
            memory_mb: AtomicU64::new(10),
            usage_fails: AtomicBool::new(false),
            stop_mode: Mutex::new(StopMode::Clean),
            kill_fails: AtomicBool::new(false),
            kill_hangs: AtomicBool::new(false),
            stop_gate: Notify::new(),
            stop_entered: Notify::new(),
            stops: AtomicUsize::new(0),
            kills: AtomicUsize::new(0),
        })
    }

    pub fn ready(pid: u32) -> Arc<Self> {
        Self::new(pid, WorkerState::Ready)
    }

    pub fn set_memory_mb(&self, mb: u64) {
        self.memory_mb.store(mb, Ordering::SeqCst);
    }

    pub fn fail_usage(&self) {
        self.usage_fails.store(true, Ordering::SeqCst);
    }

    pub fn set_stop_mode(&self, mode: StopMode) {
        *self.stop_mode.lock() = mode;
    }

    pub fn fail_kill(&self) {
        self.kill_fails.store(true, Ordering::SeqCst);
    }

    /// Makes `kill` never return, like a process stuck in the kernel.
    pub fn hang_kill(&self) {
        self.kill_hangs.store(true, Ordering::SeqCst);
    }

    pub fn release_stop(&self) {
        self.stop_gate.notify_one();
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Worker for FakeWorker {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn state(&self) -> &StateCell {
        &self.state
    }

    fn resource_usage(&self) -> Result<ResourceUsage, WorkerError> {
        if self.usage_fails.load(Ordering::SeqCst) {
            return Err(WorkerError::ResourceUnavailable {
                pid: self.pid,
                reason: "process exited".into(),
            });
        }
        Ok(ResourceUsage {
            memory_bytes: self.memory_mb.load(Ordering::SeqCst) * MB,
            cpu_time: std::time::Duration::ZERO,
        })
    }

    async fn stop(&self) -> Result<(), WorkerError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.stop_entered.notify_one();
        let mode = *self.stop_mode.lock();
        match mode {
            StopMode::Clean => Ok(()),
            StopMode::Hang => std::future::pending().await,
            StopMode::Gated => {
                self.stop_gate.notified().await;
                Ok(())
            }
        }
    }

    async fn kill(&self) -> Result<(), WorkerError> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        if self.kill_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.kill_fails.load(Ordering::SeqCst) {
            return Err(WorkerError::Signal {
                pid: self.pid,
                reason: "EPERM".into(),
            });
        }
        Ok(())
    }
}

/// Factory handing out `FakeWorker`s with increasing pids.
pub struct FakeFactory {
    next_pid: AtomicU32,
    fail: AtomicBool,
    pub spawned: Mutex<Vec<Arc<FakeWorker>>>,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_pid: AtomicU32::new(100),
            fail: AtomicBool::new(false),
            spawned: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_spawns(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn spawned_count(&self) -> usize {
        self.spawned.lock().len()
    }

    pub fn worker(&self, pid: u32) -> Option<Arc<FakeWorker>> {
        self.spawned.lock().iter().find(|w| w.pid == pid).cloned()
    }
}

#[async_trait]
impl Factory for FakeFactory {
    async fn new_worker(&self, _ctx: CancellationToken) -> Result<WorkerRef, WorkerError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(WorkerError::Spawn(std::io::Error::other("factory disabled")));
        }
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let worker = FakeWorker::new(pid, WorkerState::Inactive);
        self.spawned.lock().push(Arc::clone(&worker));
        Ok(worker)
    }
}

/// Pool without replenishment or allocation; removal stops and destroys.
#[derive(Default)]
pub struct ListPool {
    list: Mutex<Vec<WorkerRef>>,
    failing: Mutex<Vec<u32>>,
    pub removals: AtomicUsize,
}

impl ListPool {
    pub fn new(workers: Vec<Arc<FakeWorker>>) -> Arc<Self> {
        let pool = Arc::new(Self::default());
        for w in workers {
            pool.push(w);
        }
        pool
    }

    pub fn push(&self, worker: Arc<FakeWorker>) {
        self.list.lock().push(worker);
    }

    pub fn len(&self) -> usize {
        self.list.lock().len()
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.list.lock().iter().any(|w| w.pid() == pid)
    }

    /// Drops `pid` from the list without touching the worker.
    pub fn detach(&self, pid: u32) {
        self.list.lock().retain(|w| w.pid() != pid);
    }

    /// Makes every removal of `pid` fail.
    pub fn fail_removal(&self, pid: u32) {
        self.failing.lock().push(pid);
    }
}

#[async_trait]
impl Pool for ListPool {
    fn workers(&self) -> Vec<WorkerRef> {
        self.list.lock().clone()
    }

    async fn remove_worker(&self, worker: &WorkerRef) -> Result<Removal, PoolError> {
        let pid = worker.pid();
        if self.failing.lock().contains(&pid) {
            return Err(PoolError::RemovalTimeout {
                pid,
                timeout: Duration::from_secs(1),
                source: WorkerError::Signal {
                    pid,
                    reason: "EPERM".into(),
                },
            });
        }

        let claimed = {
            let mut list = self.list.lock();
            let idx = list.iter().position(|w| w.pid() == pid);
            idx.map(|i| list.remove(i))
        };
        let Some(worker) = claimed else {
            return Ok(Removal::AlreadyGone);
        };

        self.removals.fetch_add(1, Ordering::SeqCst);
        let _ = worker.state().transition(WorkerState::Invalid);
        worker.stop().await?;
        let _ = worker.state().transition(WorkerState::Destroyed);
        Ok(Removal::Removed)
    }
}
