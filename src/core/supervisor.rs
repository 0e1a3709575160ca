//! # Supervisor: periodic eviction loop over a pool.
//!
//! The [`Supervisor`] wakes every `watch_tick`, takes a snapshot of the pool's
//! workers and evicts those that violate the configured policies. It never
//! touches worker state itself; every eviction goes through
//! [`Pool::remove_worker`], and every outcome is published on the [`Bus`].
//!
//! ## Tick
//! ```text
//! now ─► pool.workers() (snapshot)
//!          │
//!          ├─ Invalid / Destroyed ───────────────► skip
//!          ├─ resource_usage() fails ────────────► skip (process likely gone)
//!          ├─ evaluate(): Ttl > MaxMemory > IdleTtl
//!          │     └─ violation ─► pool.remove_worker(w)
//!          │                       ├─ Removed     ─► publish(Ttl | MaxMemory | IdleTtl)
//!          │                       ├─ AlreadyGone ─► skip
//!          │                       └─ Err         ─► publish(SupervisorError), abort tick
//!          └─ no violation ──────────────────────► pool_memory += rss
//! ```
//!
//! ## Lifecycle
//! - [`start`](Supervisor::start) spawns the loop on a background task; calling
//!   it again is a no-op.
//! - [`stop`](Supervisor::stop) cancels the loop and returns immediately; it is
//!   safe to call any number of times. A tick already in progress finishes
//!   (including an in-flight removal); no new tick starts afterwards.
//! - [`stopped`](Supervisor::stopped) waits for the background task to exit.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use poolvisor::{Bus, PoolConfig, ProcessFactory, StaticPool, Supervisor, SupervisorConfig};
//! use tokio::process::Command;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), poolvisor::PoolError> {
//!     let bus = Bus::new(1024);
//!     let factory = Arc::new(ProcessFactory::new(|| Command::new("my-worker")));
//!     let pool = StaticPool::new(PoolConfig::default(), factory, bus.clone(), CancellationToken::new()).await?;
//!
//!     let sup = Supervisor::new(
//!         pool.clone(),
//!         bus,
//!         SupervisorConfig {
//!             ttl: Duration::from_secs(3600),
//!             max_worker_memory: 256,
//!             ..SupervisorConfig::default()
//!         },
//!     )?;
//!     sup.start();
//!
//!     // ... serve traffic ...
//!
//!     sup.stop();
//!     sup.stopped().await;
//!     pool.destroy().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::core::{Pool, Removal, SupervisorConfig};
use crate::error::PoolError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::evaluate;
use crate::worker::WorkerState;

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Workers whose usage was read and checked against the policies.
    pub evaluated: usize,
    /// Workers removed by this tick.
    pub evicted: usize,
    /// Workers skipped (excluded state, unreadable usage or removed by someone else).
    pub skipped: usize,
    /// True when a removal failed and the rest of the snapshot was not scanned.
    pub aborted: bool,
    /// Resident bytes of the evaluated workers that stayed in the pool.
    pub pool_memory: u64,
}

impl TickSummary {
    /// True when `pool_memory` reached `max_pool_memory`.
    ///
    /// Informational only; no worker is evicted because of it.
    pub fn pool_memory_exceeded(&self, cfg: &SupervisorConfig) -> bool {
        cfg.max_pool_memory_bytes()
            .is_some_and(|limit| self.pool_memory >= limit)
    }
}

/// State shared between the handle and the background loop.
struct Control {
    cfg: SupervisorConfig,
    pool: Arc<dyn Pool>,
    bus: Bus,
}

impl Control {
    async fn run(self: Arc<Self>, token: CancellationToken) {
        let period = self.cfg.watch_tick;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
        tracing::debug!("supervisor stopped");
    }

    async fn tick(&self) -> TickSummary {
        let now = Instant::now();
        let workers = self.pool.workers();
        let mut summary = TickSummary::default();

        for worker in &workers {
            if matches!(
                worker.state().value(),
                WorkerState::Invalid | WorkerState::Destroyed
            ) {
                summary.skipped += 1;
                continue;
            }

            let Ok(usage) = worker.resource_usage() else {
                summary.skipped += 1;
                continue;
            };
            summary.evaluated += 1;

            let Some(eviction) = evaluate(&self.cfg, worker.as_ref(), &usage, now) else {
                summary.pool_memory = summary.pool_memory.saturating_add(usage.memory_bytes);
                continue;
            };

            match self.pool.remove_worker(worker).await {
                Ok(Removal::Removed) => {
                    summary.evicted += 1;
                    self.bus
                        .publish(Event::new(eviction.event_kind()).with_worker(worker));
                }
                Ok(Removal::AlreadyGone) => {
                    tracing::debug!(pid = worker.pid(), ?eviction, "worker left before eviction");
                    summary.skipped += 1;
                }
                Err(e) => {
                    summary.aborted = true;
                    self.bus
                        .publish(Event::new(EventKind::SupervisorError).with_error(e));
                    break;
                }
            }
        }

        tracing::trace!(
            workers = workers.len(),
            evaluated = summary.evaluated,
            evicted = summary.evicted,
            skipped = summary.skipped,
            aborted = summary.aborted,
            pool_memory = summary.pool_memory,
            "supervisor tick"
        );
        summary
    }
}

/// Periodic policy enforcer for one pool.
///
/// Dropping the supervisor stops its loop.
pub struct Supervisor {
    inner: Arc<Control>,
    token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Supervisor {
    /// Creates a stopped supervisor.
    ///
    /// Fails with [`PoolError::ConfigInvalid`] if `cfg` does not validate.
    pub fn new(pool: Arc<dyn Pool>, bus: Bus, cfg: SupervisorConfig) -> Result<Self, PoolError> {
        cfg.validate()?;
        Ok(Self {
            inner: Arc::new(Control { cfg, pool, bus }),
            token: CancellationToken::new(),
            handle: Mutex::new(None),
        })
    }

    /// Policy this supervisor enforces.
    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.cfg
    }

    /// Spawns the control loop. No-op if already started or stopped.
    ///
    /// Must be called inside a tokio runtime. The first tick fires one
    /// `watch_tick` after this call.
    pub fn start(&self) {
        let mut handle = self.handle.lock();
        if handle.is_some() || self.token.is_cancelled() {
            return;
        }
        let control = Arc::clone(&self.inner);
        *handle = Some(tokio::spawn(control.run(self.token.clone())));
    }

    /// Requests the loop to exit. Never blocks; repeated calls are no-ops.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Waits until the background loop has exited.
    ///
    /// Returns immediately if the loop was never started. Call
    /// [`stop`](Self::stop) first, otherwise this waits forever.
    pub async fn stopped(&self) {
        let handle = self.handle.lock().take();
        if let Some(h) = handle {
            if let Err(e) = h.await {
                tracing::warn!(error = %e, "supervisor task ended abnormally");
            }
        }
    }

    /// True while the background loop is running.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Runs one tick on the caller's task.
    ///
    /// Ticks are not serialized with the background loop; when the loop is
    /// running, a concurrent manual tick may race it on the same workers.
    pub async fn tick(&self) -> TickSummary {
        self.inner.tick().await
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PoolConfig, StaticPool};
    use crate::testing::{FakeFactory, FakeWorker, ListPool, StopMode, count, drain};
    use crate::worker::{MB, Worker};
    use std::time::Duration;

    fn supervisor(pool: Arc<ListPool>, bus: &Bus, cfg: SupervisorConfig) -> Supervisor {
        Supervisor::new(pool, bus.clone(), cfg).unwrap()
    }

    fn ttl(secs: u64) -> SupervisorConfig {
        SupervisorConfig {
            ttl: Duration::from_secs(secs),
            ..SupervisorConfig::default()
        }
    }

    #[tokio::test]
    async fn rejects_zero_tick() {
        let cfg = SupervisorConfig {
            watch_tick: Duration::ZERO,
            ..SupervisorConfig::default()
        };
        let err = Supervisor::new(ListPool::new(vec![]), Bus::new(8), cfg).err().unwrap();
        assert!(matches!(err, PoolError::ConfigInvalid { field: "watch_tick", .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_evicts_once_per_worker() {
        let bus = Bus::new(32);
        let mut rx = bus.subscribe();
        let old = FakeWorker::ready(1);
        let pool = ListPool::new(vec![old.clone()]);
        time::advance(Duration::from_secs(11)).await;
        let young = FakeWorker::ready(2);
        pool.push(young.clone());

        let sup = supervisor(pool.clone(), &bus, ttl(10));
        let summary = sup.tick().await;

        assert_eq!(summary.evicted, 1);
        assert_eq!(pool.len(), 1);
        assert!(!pool.contains(1));
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Ttl);
        assert_eq!(events[0].pid(), Some(1));

        // Already gone: no second event.
        sup.tick().await;
        assert!(drain(&mut rx).is_empty());
        assert_eq!(old.state().value(), WorkerState::Destroyed);
        assert_eq!(young.state().value(), WorkerState::Ready);
    }

    #[tokio::test]
    async fn memory_ceiling_and_unreadable_worker() {
        let bus = Bus::new(32);
        let mut rx = bus.subscribe();
        let fat = FakeWorker::ready(1);
        fat.set_memory_mb(150);
        let gone = FakeWorker::ready(2);
        gone.fail_usage();
        let ok = FakeWorker::ready(3);
        let pool = ListPool::new(vec![fat, gone, ok]);

        let sup = supervisor(
            pool.clone(),
            &bus,
            SupervisorConfig {
                max_worker_memory: 100,
                ..SupervisorConfig::default()
            },
        );
        let summary = sup.tick().await;

        assert_eq!(summary.evicted, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.evaluated, 2);
        assert!(!summary.aborted);
        assert_eq!(summary.pool_memory, 10 * MB);
        assert!(pool.contains(2));
        assert!(pool.contains(3));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::MaxMemory);
        assert_eq!(events[0].pid(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_ttl_spares_working_workers() {
        let bus = Bus::new(32);
        let mut rx = bus.subscribe();
        let idle = FakeWorker::ready(1);
        let busy = FakeWorker::new(2, WorkerState::Working);
        let pool = ListPool::new(vec![idle, busy.clone()]);
        time::advance(Duration::from_secs(6)).await;

        let sup = supervisor(
            pool.clone(),
            &bus,
            SupervisorConfig {
                idle_ttl: Duration::from_secs(5),
                ..SupervisorConfig::default()
            },
        );
        sup.tick().await;

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::IdleTtl);
        assert_eq!(events[0].pid(), Some(1));
        assert!(pool.contains(2));
        assert_eq!(busy.state().value(), WorkerState::Working);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_time_counts_from_last_release() {
        let bus = Bus::new(32);
        let w = FakeWorker::new(1, WorkerState::Working);
        let pool = ListPool::new(vec![w.clone()]);
        time::advance(Duration::from_secs(10)).await;
        assert!(w.state().finish_exec());
        time::advance(Duration::from_secs(3)).await;

        let sup = supervisor(
            pool.clone(),
            &bus,
            SupervisorConfig {
                idle_ttl: Duration::from_secs(5),
                ..SupervisorConfig::default()
            },
        );
        assert_eq!(sup.tick().await.evicted, 0);

        time::advance(Duration::from_secs(2)).await;
        assert_eq!(sup.tick().await.evicted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn first_violated_policy_wins() {
        let bus = Bus::new(32);
        let mut rx = bus.subscribe();
        let w = FakeWorker::ready(1);
        w.set_memory_mb(500);
        let pool = ListPool::new(vec![w]);
        time::advance(Duration::from_secs(20)).await;

        let sup = supervisor(
            pool.clone(),
            &bus,
            SupervisorConfig {
                ttl: Duration::from_secs(10),
                idle_ttl: Duration::from_secs(10),
                max_worker_memory: 100,
                ..SupervisorConfig::default()
            },
        );
        sup.tick().await;

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Ttl);
        assert_eq!(pool.removals.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_workers_are_not_supervised() {
        let bus = Bus::new(32);
        let mut rx = bus.subscribe();
        let pool = ListPool::new(vec![FakeWorker::new(1, WorkerState::Invalid)]);
        time::advance(Duration::from_secs(20)).await;

        let summary = supervisor(pool.clone(), &bus, ttl(10)).tick().await;
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.evaluated, 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_removal_aborts_the_tick() {
        let bus = Bus::new(32);
        let mut rx = bus.subscribe();
        let pool = ListPool::new(vec![
            FakeWorker::ready(1),
            FakeWorker::ready(2),
            FakeWorker::ready(3),
        ]);
        pool.fail_removal(2);
        time::advance(Duration::from_secs(20)).await;

        let sup = supervisor(pool.clone(), &bus, ttl(10));
        let summary = sup.tick().await;

        assert!(summary.aborted);
        assert_eq!(summary.evicted, 1);
        assert_eq!(summary.evaluated, 2);
        assert!(pool.contains(3), "worker after the failure was evaluated");

        let events = drain(&mut rx);
        assert_eq!(count(&events, EventKind::SupervisorError), 1);
        assert_eq!(count(&events, EventKind::Ttl), 1);
        let err = events
            .iter()
            .find_map(|e| e.error())
            .expect("supervisor error carries the removal error");
        assert!(matches!(err, PoolError::RemovalTimeout { pid: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn workers_added_mid_tick_wait_for_the_next_one() {
        let bus = Bus::new(32);
        let first = FakeWorker::ready(1);
        first.set_stop_mode(StopMode::Gated);
        let pool = ListPool::new(vec![first.clone()]);
        time::advance(Duration::from_secs(20)).await;

        let sup = Arc::new(supervisor(pool.clone(), &bus, ttl(10)));
        let s = Arc::clone(&sup);
        let tick = tokio::spawn(async move { s.tick().await });

        first.stop_entered.notified().await;
        pool.push(FakeWorker::new(2, WorkerState::Ready));
        time::advance(Duration::from_secs(20)).await;
        first.release_stop();

        let summary = tick.await.unwrap();
        assert_eq!(summary.evaluated, 1);
        assert!(pool.contains(2));

        assert_eq!(sup.tick().await.evicted, 1);
        assert!(!pool.contains(2));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_recycle_is_not_an_error() {
        let bus = Bus::new(32);
        let mut rx = bus.subscribe();
        let a = FakeWorker::ready(1);
        a.set_stop_mode(StopMode::Gated);
        let b = FakeWorker::ready(2);
        let pool = ListPool::new(vec![a.clone(), b.clone()]);
        time::advance(Duration::from_secs(20)).await;

        let sup = Arc::new(supervisor(pool.clone(), &bus, ttl(10)));
        let s = Arc::clone(&sup);
        let tick = tokio::spawn(async move { s.tick().await });

        // b leaves the pool after the snapshot, before the supervisor reaches it.
        a.stop_entered.notified().await;
        pool.detach(2);
        a.release_stop();

        let summary = tick.await.unwrap();
        assert!(!summary.aborted);
        assert_eq!(summary.evaluated, 2);
        assert_eq!(summary.evicted, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(pool.removals.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(b.stop_count(), 0);

        let events = drain(&mut rx);
        assert_eq!(count(&events, EventKind::SupervisorError), 0);
        // Only the worker this tick actually removed is reported.
        let ttl: Vec<_> = events
            .iter()
            .filter(|e| e.kind == EventKind::Ttl)
            .map(|e| e.pid())
            .collect();
        assert_eq!(ttl, vec![Some(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_ticks_until_stopped() {
        let bus = Bus::new(32);
        let mut rx = bus.subscribe();
        let pool = ListPool::new(vec![]);
        let sup = supervisor(pool.clone(), &bus, ttl(5));
        sup.start();
        sup.start();
        assert!(sup.is_running());

        pool.push(FakeWorker::ready(1));
        time::sleep(Duration::from_secs(6)).await;
        // Ticks at 1s..6s; the worker hit its TTL at 5s.
        time::sleep(Duration::from_millis(100)).await;
        assert!(!pool.contains(1));
        assert_eq!(count(&drain(&mut rx), EventKind::Ttl), 1);

        sup.stop();
        sup.stop();
        sup.stopped().await;
        assert!(!sup.is_running());

        pool.push(FakeWorker::ready(2));
        time::sleep(Duration::from_secs(30)).await;
        assert!(pool.contains(2));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_mid_tick_finishes_the_removal() {
        let bus = Bus::new(32);
        let mut rx = bus.subscribe();
        let w = FakeWorker::ready(1);
        w.set_stop_mode(StopMode::Gated);
        let pool = ListPool::new(vec![w.clone()]);
        time::advance(Duration::from_secs(20)).await;

        let sup = supervisor(pool.clone(), &bus, ttl(10));
        sup.start();
        w.stop_entered.notified().await;

        sup.stop();
        pool.push(FakeWorker::ready(2));
        w.release_stop();
        sup.stopped().await;

        assert_eq!(w.state().value(), WorkerState::Destroyed);
        assert_eq!(count(&drain(&mut rx), EventKind::Ttl), 1);

        time::sleep(Duration::from_secs(15)).await;
        assert!(pool.contains(2), "a tick ran after stop");
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_before_start_prevents_the_loop() {
        let sup = supervisor(ListPool::new(vec![]), &Bus::new(8), ttl(10));
        sup.stop();
        sup.start();
        assert!(!sup.is_running());
        sup.stopped().await;
    }

    #[tokio::test]
    async fn pool_memory_is_aggregated_but_not_enforced() {
        let bus = Bus::new(32);
        let mut rx = bus.subscribe();
        let pool = ListPool::new(vec![FakeWorker::ready(1), FakeWorker::ready(2)]);
        let cfg = SupervisorConfig {
            max_pool_memory: 15,
            ..SupervisorConfig::default()
        };
        let sup = supervisor(pool.clone(), &bus, cfg.clone());

        let summary = sup.tick().await;
        assert_eq!(summary.pool_memory, 20 * MB);
        assert!(summary.pool_memory_exceeded(&cfg));
        assert_eq!(pool.len(), 2);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn evicted_workers_are_replaced_by_static_pool() {
        let bus = Bus::new(64);
        let factory = FakeFactory::new();
        let pool = StaticPool::new(
            PoolConfig {
                num_workers: 2,
                ..PoolConfig::default()
            },
            factory.clone(),
            bus.clone(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        let mut rx = bus.subscribe();
        time::advance(Duration::from_secs(11)).await;

        let sup = Supervisor::new(pool.clone(), bus.clone(), ttl(10)).unwrap();
        let summary = sup.tick().await;

        assert_eq!(summary.evicted, 2);
        assert_eq!(pool.len(), 2);
        assert!(pool.workers().iter().all(|w| w.pid() >= 102));

        let events = drain(&mut rx);
        assert_eq!(count(&events, EventKind::Ttl), 2);
        assert_eq!(count(&events, EventKind::Destruct), 2);
        assert_eq!(count(&events, EventKind::WorkerConstructed), 2);
        assert_eq!(count(&events, EventKind::SupervisorError), 0);
    }
}
