//! # Worker pools.
//!
//! [`Pool`] is the narrow capability set the [`Supervisor`](crate::Supervisor)
//! depends on: a membership snapshot and an idempotent removal.
//! [`StaticPool`] is the fixed-size implementation with allocation, release,
//! recycling and replenishment.
//!
//! ## Architecture
//! ```text
//!                ┌──────────── StaticPool ────────────┐
//! allocate() ───►│ free queue (deque) ─► Ready→Working │
//! release()  ───►│ Working→Ready ──► free queue        │
//! workers()  ───►│ members: RwLock<Vec<WorkerRef>>     │◄─── Supervisor (snapshot)
//! remove()   ───►│ claim → retire → Destruct → refill  │◄─── Supervisor (evict)
//!                └────────────────┬────────────────────┘
//!                                 ▼
//!                         Factory::new_worker()
//! ```
//!
//! ## Rules
//! - Membership is guarded by the pool; callers never hold its lock.
//! - A removal is honored once per worker: the first caller takes the worker
//!   out of `members` and gets [`Removal::Removed`]; later callers get
//!   [`Removal::AlreadyGone`] and do nothing.
//! - Removing a `Working` worker waits for it to return to `Ready`, at most
//!   until `destroy_timeout`; after that it is stopped anyway.
//! - The free queue only holds idle members. It shares the membership lock,
//!   and a removal takes the worker out of both at once.
//! - A `kill` that does not return within a few seconds counts as a failed
//!   removal.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Notify;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::core::PoolConfig;
use crate::error::{PoolError, WorkerError};
use crate::events::{Bus, Event, EventKind};
use crate::worker::{Factory, WorkerRef, WorkerState};

/// Capability set a supervisor needs from a pool.
#[async_trait]
pub trait Pool: Send + Sync + 'static {
    /// Copy of the current membership, in insertion order.
    ///
    /// Later changes to the pool do not affect the returned vector.
    fn workers(&self) -> Vec<WorkerRef>;

    /// Gracefully terminates `worker` and takes it out of the pool.
    ///
    /// Returns [`Removal::AlreadyGone`] if someone else removed it first.
    async fn remove_worker(&self, worker: &WorkerRef) -> Result<Removal, PoolError>;
}

/// What a successful [`Pool::remove_worker`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// This call took the worker out of the pool and stopped it.
    Removed,
    /// The worker was no longer a member; nothing was done.
    AlreadyGone,
}

/// Upper bound on waiting for a killed worker to exit.
const KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// How a removal treats a busy worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retire {
    /// Wait (bounded) for the current unit of work to finish.
    Graceful,
    /// Invalidate immediately, even mid-work.
    Force,
}

struct Members {
    list: Vec<WorkerRef>,
    /// Idle members in hand-out order.
    free: VecDeque<WorkerRef>,
    /// Spawns in flight that already count toward `num_workers`.
    spawning: usize,
}

/// Fixed-size worker pool.
pub struct StaticPool {
    cfg: PoolConfig,
    factory: Arc<dyn Factory>,
    bus: Bus,
    members: RwLock<Members>,
    /// Signalled whenever a worker is pushed to `Members::free`.
    freed: Notify,
    /// Cancelled by `destroy`; parent of every factory context.
    token: CancellationToken,
    destroyed: AtomicBool,
}

impl StaticPool {
    /// Validates `cfg` and spawns `num_workers` workers.
    ///
    /// If any spawn fails the already started workers are stopped and
    /// [`PoolError::AllocationFailure`] is returned.
    pub async fn new(
        cfg: PoolConfig,
        factory: Arc<dyn Factory>,
        bus: Bus,
        ctx: CancellationToken,
    ) -> Result<Arc<Self>, PoolError> {
        cfg.validate()?;

        let pool = Arc::new(Self {
            members: RwLock::new(Members {
                list: Vec::with_capacity(cfg.num_workers),
                free: VecDeque::with_capacity(cfg.num_workers),
                spawning: 0,
            }),
            cfg,
            factory,
            bus,
            freed: Notify::new(),
            token: ctx.child_token(),
            destroyed: AtomicBool::new(false),
        });

        let spawns = (0..pool.cfg.num_workers).map(|_| pool.spawn_worker());
        let results = futures::future::join_all(spawns).await;
        if let Some(err) = results.into_iter().find_map(Result::err) {
            pool.destroy().await;
            return Err(err);
        }

        tracing::debug!(workers = pool.len(), "worker pool started");
        Ok(pool)
    }

    /// Pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.cfg
    }

    /// Event bus this pool publishes to.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Current number of members.
    pub fn len(&self) -> usize {
        self.members.read().list.len()
    }

    /// True when the pool has no members.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of idle workers waiting to be allocated.
    pub fn available(&self) -> usize {
        self.members.read().free.len()
    }

    /// True once [`destroy`](Self::destroy) was called.
    pub fn is_destroyed(&self) -> bool {
        self.token.is_cancelled()
    }

    fn contains(&self, pid: u32) -> bool {
        self.members.read().list.iter().any(|w| w.pid() == pid)
    }

    /// Takes `pid` out of the membership list. Only the first caller gets it.
    fn claim(&self, pid: u32) -> Option<WorkerRef> {
        let mut members = self.members.write();
        let idx = members.list.iter().position(|w| w.pid() == pid)?;
        members.free.retain(|w| w.pid() != pid);
        Some(members.list.remove(idx))
    }

    /// Queues an idle member for allocation. Returns false for non-members.
    fn push_free(&self, worker: WorkerRef) -> bool {
        {
            let mut members = self.members.write();
            if self.is_destroyed() || !members.list.iter().any(|w| w.pid() == worker.pid()) {
                return false;
            }
            members.free.push_back(worker);
        }
        self.freed.notify_one();
        true
    }

    /// Pops the first free worker that can be moved from `Ready` to `Working`.
    fn pop_free(&self) -> Option<WorkerRef> {
        let mut members = self.members.write();
        while let Some(worker) = members.free.pop_front() {
            if worker
                .state()
                .compare_and_set(WorkerState::Ready, WorkerState::Working)
            {
                if !members.free.is_empty() {
                    // Pass the wakeup on; one permit may stand for several pushes.
                    self.freed.notify_one();
                }
                return Some(worker);
            }
        }
        None
    }

    /// Reserves a spawn slot if membership plus in-flight spawns is below `num_workers`.
    fn reserve_slot(&self) -> bool {
        let mut members = self.members.write();
        if members.list.len() + members.spawning >= self.cfg.num_workers {
            return false;
        }
        members.spawning += 1;
        true
    }

    /// Spawns one worker and adds it to the pool.
    ///
    /// Assumes the caller accounted for the new member (startup) or holds a
    /// reservation from [`reserve_slot`](Self::reserve_slot).
    async fn spawn_worker(&self) -> Result<WorkerRef, PoolError> {
        let spawned = self
            .factory
            .new_worker(self.token.child_token())
            .await
            .map_err(PoolError::AllocationFailure);

        let worker = match spawned {
            Ok(w) => w,
            Err(e) => {
                let mut members = self.members.write();
                members.spawning = members.spawning.saturating_sub(1);
                return Err(e);
            }
        };

        let _ = worker
            .state()
            .compare_and_set(WorkerState::Inactive, WorkerState::Ready);

        {
            let mut members = self.members.write();
            members.spawning = members.spawning.saturating_sub(1);
            members.list.push(Arc::clone(&worker));
        }
        self.push_free(Arc::clone(&worker));
        self.bus
            .publish(Event::new(EventKind::WorkerConstructed).with_worker(&worker));
        Ok(worker)
    }

    /// Spawns replacements until the pool is back at `num_workers`.
    async fn replenish(&self) -> Result<(), PoolError> {
        while !self.is_destroyed() && self.reserve_slot() {
            self.spawn_worker().await?;
        }
        Ok(())
    }

    /// Takes a `Ready` worker and marks it `Working`.
    ///
    /// Waits up to `allocate_timeout`. When the pool is below size a
    /// replacement is spawned first. If that fails the remaining members are
    /// still served; the factory error is returned as
    /// [`PoolError::AllocationFailure`] only when the pool is empty or no
    /// member frees up in time.
    pub async fn allocate(&self) -> Result<WorkerRef, PoolError> {
        if self.is_destroyed() {
            return Err(PoolError::Destroyed);
        }
        let shortfall = match self.replenish().await {
            Ok(()) => None,
            Err(e) if self.is_empty() => return Err(e),
            Err(e) => Some(e),
        };

        let timeout = self.cfg.allocate_timeout;
        let waited = tokio::select! {
            _ = self.token.cancelled() => return Err(PoolError::Destroyed),
            waited = time::timeout(timeout, self.next_free()) => waited,
        };
        match waited {
            Ok(worker) => {
                if let Some(e) = shortfall {
                    self.bus
                        .publish(Event::new(EventKind::AllocationFailed).with_error(e));
                }
                Ok(worker)
            }
            Err(_elapsed) => {
                self.bus.publish(
                    Event::new(EventKind::NoFreeWorkers)
                        .with_error(PoolError::NoFreeWorkers { timeout }),
                );
                Err(shortfall.unwrap_or(PoolError::NoFreeWorkers { timeout }))
            }
        }
    }

    /// Waits for a free worker and marks it `Working`.
    async fn next_free(&self) -> WorkerRef {
        loop {
            if let Some(worker) = self.pop_free() {
                return worker;
            }
            self.freed.notified().await;
        }
    }

    /// Returns a worker after one unit of work.
    ///
    /// Records the execution, then either re-queues the worker or recycles it
    /// once it reached `max_jobs`. Workers removed while busy are not re-queued.
    pub async fn release(&self, worker: WorkerRef) {
        if !worker.state().finish_exec() {
            return;
        }

        if let Some(max_jobs) = self.cfg.max_jobs() {
            if worker.state().num_execs() >= max_jobs {
                if self.contains(worker.pid()) {
                    self.bus
                        .publish(Event::new(EventKind::MaxJobsReached).with_worker(&worker));
                }
                if let Err(e) = self.remove_worker(&worker).await {
                    tracing::warn!(pid = worker.pid(), error = %e, "failed to recycle worker");
                }
                return;
            }
        }

        self.push_free(worker);
    }

    /// Runs `f` against an allocated worker and releases it afterwards.
    ///
    /// With an exec TTL configured, overrunning work is abandoned: the worker is
    /// removed forcibly, `ExecTtl` is published and [`PoolError::ExecTtl`] returned.
    pub async fn exec<F, Fut, T>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce(WorkerRef) -> Fut,
        Fut: Future<Output = T>,
    {
        let worker = self.allocate().await?;
        let work = f(Arc::clone(&worker));

        let out = match self.cfg.exec_ttl() {
            None => work.await,
            Some(ttl) => match time::timeout(ttl, work).await {
                Ok(out) => out,
                Err(_elapsed) => {
                    let pid = worker.pid();
                    self.bus
                        .publish(Event::new(EventKind::ExecTtl).with_worker(&worker));
                    self.remove(&worker, Retire::Force).await?;
                    return Err(PoolError::ExecTtl { pid, ttl });
                }
            },
        };

        self.release(worker).await;
        Ok(out)
    }

    /// Stops every worker and rejects further allocations.
    ///
    /// Busy workers get up to `destroy_timeout` to finish. Only the first call
    /// does anything.
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.token.cancel();

        let workers: Vec<WorkerRef> = {
            let mut members = self.members.write();
            members.free.clear();
            std::mem::take(&mut members.list)
        };

        let retires = workers.iter().map(|w| async move {
            match self.retire(w, Retire::Graceful).await {
                Ok(()) => self
                    .bus
                    .publish(Event::new(EventKind::Destruct).with_worker(w)),
                Err(e) => {
                    tracing::warn!(pid = w.pid(), error = %e, "failed to stop worker on destroy");
                }
            }
        });
        futures::future::join_all(retires).await;

        self.bus.publish(Event::new(EventKind::PoolDestroyed));
        tracing::debug!("worker pool destroyed");
    }

    /// Claim, retire, report, refill.
    async fn remove(&self, worker: &WorkerRef, mode: Retire) -> Result<Removal, PoolError> {
        let Some(worker) = self.claim(worker.pid()) else {
            tracing::debug!(pid = worker.pid(), "worker already removed");
            return Ok(Removal::AlreadyGone);
        };

        let retired = self.retire(&worker, mode).await;
        if retired.is_ok() {
            self.bus
                .publish(Event::new(EventKind::Destruct).with_worker(&worker));
        }

        if let Err(e) = self.replenish().await {
            self.bus
                .publish(Event::new(EventKind::AllocationFailed).with_error(e));
        }
        retired.map(|()| Removal::Removed)
    }

    /// Invalidates the worker, stops it within `destroy_timeout`, kills it otherwise.
    async fn retire(&self, worker: &WorkerRef, mode: Retire) -> Result<(), PoolError> {
        let timeout = self.cfg.destroy_timeout;
        let deadline = Instant::now() + timeout;
        let state = worker.state();

        match mode {
            Retire::Force => {
                let _ = state.transition(WorkerState::Invalid);
            }
            Retire::Graceful => {
                let mut changes = state.subscribe();
                while !state.invalidate_if_idle() {
                    if state.value() == WorkerState::Destroyed {
                        return Ok(());
                    }
                    match time::timeout_at(deadline, changes.changed()).await {
                        Ok(Ok(())) => continue,
                        _ => {
                            tracing::debug!(pid = worker.pid(), "worker still busy, forcing removal");
                            let _ = state.transition(WorkerState::Invalid);
                            break;
                        }
                    }
                }
            }
        }

        let stopped = match time::timeout_at(deadline, worker.stop()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                tracing::warn!(pid = worker.pid(), error = %e, "graceful stop failed, killing");
                Self::kill(worker).await
            }
            Err(_elapsed) => {
                tracing::warn!(pid = worker.pid(), ?timeout, "graceful stop timed out, killing");
                Self::kill(worker).await
            }
        };

        let _ = state.transition(WorkerState::Destroyed);
        stopped.map_err(|source| PoolError::RemovalTimeout {
            pid: worker.pid(),
            timeout,
            source,
        })
    }

    /// `Worker::kill`, bounded by [`KILL_TIMEOUT`].
    async fn kill(worker: &WorkerRef) -> Result<(), WorkerError> {
        match time::timeout(KILL_TIMEOUT, worker.kill()).await {
            Ok(killed) => killed,
            Err(_elapsed) => Err(WorkerError::Unresponsive {
                pid: worker.pid(),
                timeout: KILL_TIMEOUT,
            }),
        }
    }
}

#[async_trait]
impl Pool for StaticPool {
    fn workers(&self) -> Vec<WorkerRef> {
        self.members.read().list.clone()
    }

    async fn remove_worker(&self, worker: &WorkerRef) -> Result<Removal, PoolError> {
        self.remove(worker, Retire::Graceful).await
    }
}
