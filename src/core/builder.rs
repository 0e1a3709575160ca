//! # Wiring a supervised pool.
//!
//! [`PoolBuilder`] assembles the pieces a caller would otherwise connect by
//! hand: the [`Bus`], a [`SubscriberSet`] fed from it, the [`StaticPool`] and,
//! when `PoolConfig::supervisor` is set, a started [`Supervisor`].
//!
//! ```text
//! PoolBuilder::build()
//!   ├─► Bus::new(bus_capacity)
//!   ├─► SubscriberSet::listen()       (before the first worker spawns)
//!   ├─► StaticPool::new(cfg, factory)
//!   └─► Supervisor::new(..).start()   (if cfg.supervisor is Some)
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use poolvisor::{PoolBuilder, PoolConfig, ProcessFactory, Subscribe, SupervisorConfig};
//! use tokio::process::Command;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), poolvisor::PoolError> {
//!     let factory = Arc::new(ProcessFactory::new(|| Command::new("my-worker")));
//!     let cfg = PoolConfig {
//!         num_workers: 4,
//!         supervisor: Some(SupervisorConfig::default()),
//!         ..PoolConfig::default()
//!     };
//!
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(poolvisor::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn Subscribe>> = Vec::new();
//!
//!     let pool = PoolBuilder::new(cfg, factory).with_subscribers(subs).build().await?;
//!     let pid = pool.exec(|worker| async move { worker.pid() }).await?;
//!     println!("handled by {pid}");
//!     pool.destroy().await;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::{Pool, PoolConfig, StaticPool, Supervisor};
use crate::error::PoolError;
use crate::events::{Bus, Event};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::worker::{Factory, WorkerRef};

/// Builder for a [`SupervisedPool`].
pub struct PoolBuilder {
    cfg: PoolConfig,
    factory: Arc<dyn Factory>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl PoolBuilder {
    /// Creates a builder for a pool of workers produced by `factory`.
    pub fn new(cfg: PoolConfig, factory: Arc<dyn Factory>) -> Self {
        Self {
            cfg,
            factory,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers.
    ///
    /// Each subscriber gets its own bounded queue; a slow one never blocks
    /// the pool or the supervisor.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Validates the configuration, spawns the workers and starts supervision.
    ///
    /// Must be called inside a tokio runtime.
    pub async fn build(self) -> Result<SupervisedPool, PoolError> {
        self.cfg.validate()?;

        let bus = Bus::new(self.cfg.bus_capacity);
        let token = CancellationToken::new();
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        let listener = subs.listen(token.child_token());

        let sv_cfg = self.cfg.supervisor.clone();
        let pool = match StaticPool::new(self.cfg, self.factory, bus.clone(), token.clone()).await
        {
            Ok(pool) => pool,
            Err(e) => {
                token.cancel();
                return Err(e);
            }
        };

        let supervisor = match sv_cfg {
            Some(cfg) => {
                let sup = Supervisor::new(pool.clone(), bus.clone(), cfg)?;
                sup.start();
                Some(sup)
            }
            None => None,
        };

        Ok(SupervisedPool {
            pool,
            supervisor,
            bus,
            token,
            fanout: Mutex::new(Some((subs, listener))),
        })
    }
}

/// A [`StaticPool`] with its supervisor and subscribers.
///
/// Call [`destroy`](Self::destroy) to shut everything down; dropping only
/// stops supervision and event delivery.
pub struct SupervisedPool {
    pool: Arc<StaticPool>,
    supervisor: Option<Supervisor>,
    bus: Bus,
    token: CancellationToken,
    fanout: Mutex<Option<(Arc<SubscriberSet>, JoinHandle<()>)>>,
}

impl SupervisedPool {
    /// Underlying pool.
    pub fn pool(&self) -> &Arc<StaticPool> {
        &self.pool
    }

    /// Running supervisor, if the config had a `supervisor` section.
    pub fn supervisor(&self) -> Option<&Supervisor> {
        self.supervisor.as_ref()
    }

    /// Event bus shared by the pool and the supervisor.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// New receiver for every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Membership snapshot.
    pub fn workers(&self) -> Vec<WorkerRef> {
        self.pool.workers()
    }

    /// See [`StaticPool::allocate`].
    pub async fn allocate(&self) -> Result<WorkerRef, PoolError> {
        self.pool.allocate().await
    }

    /// See [`StaticPool::release`].
    pub async fn release(&self, worker: WorkerRef) {
        self.pool.release(worker).await
    }

    /// See [`StaticPool::exec`].
    pub async fn exec<F, Fut, T>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce(WorkerRef) -> Fut,
        Fut: Future<Output = T>,
    {
        self.pool.exec(f).await
    }

    /// Stops supervision, destroys the pool and flushes subscribers.
    ///
    /// Subscribers receive every event published up to and including
    /// `PoolDestroyed` before this returns.
    pub async fn destroy(&self) {
        if let Some(sup) = &self.supervisor {
            sup.stop();
            sup.stopped().await;
        }
        self.pool.destroy().await;
        self.token.cancel();

        let fanout = self.fanout.lock().take();
        if let Some((subs, listener)) = fanout {
            if let Err(e) = listener.await {
                tracing::warn!(error = %e, "subscriber listener ended abnormally");
            }
            match Arc::try_unwrap(subs) {
                Ok(set) => set.shutdown().await,
                Err(_) => tracing::debug!("subscriber set still shared, not flushed"),
            }
        }
    }
}

impl Drop for SupervisedPool {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
