//! # poolvisor
//!
//! **Poolvisor** keeps a pool of long-lived worker processes healthy.
//!
//! A [`StaticPool`] owns a fixed number of workers produced by a [`Factory`],
//! hands them out one unit of work at a time and replaces them when they leave.
//! A [`Supervisor`] wakes on a fixed tick and evicts workers that outlived
//! their TTL, grew past a memory ceiling or sat idle for too long. Every
//! decision is published on the [`Bus`] for logging, metrics or orchestration.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!              ┌──────────────────────────┐
//!              │ Factory (ProcessFactory) │
//!              └────────────┬─────────────┘
//!                           │ new_worker(ctx)
//!                           ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │  StaticPool                                               │
//! │  - members (RwLock, snapshot on workers())                │
//! │  - free queue (allocate / release / exec)                 │
//! │  - remove_worker: claim → stop (SIGTERM) → kill → refill  │
//! └──────┬─────────────────────────▲──────────────────┬───────┘
//!        │ workers() snapshot      │ remove_worker()  │
//!        ▼                         │                  │
//! ┌──────────────────────────────────────────┐        │
//! │  Supervisor (every watch_tick)           │        │
//! │  Ttl ─► MaxMemory ─► IdleTtl (first wins)│        │
//! └──────┬───────────────────────────────────┘        │
//!        │ Ttl / IdleTtl / MaxMemory /                │ WorkerConstructed / Destruct /
//!        │ SupervisorError                            │ ExecTtl / MaxJobsReached / ...
//!        ▼                                            ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │                   Bus (broadcast channel)                 │
//! │             (capacity: PoolConfig::bus_capacity)          │
//! └────────────────────────────┬──────────────────────────────┘
//!                              ▼
//!                       SubscriberSet (per-subscriber queues)
//!                      ┌───────┼───────┐
//!                      ▼       ▼       ▼
//!                  LogWriter metrics custom
//! ```
//!
//! ### Worker lifecycle
//! ```text
//! Factory ──► Inactive ──► Ready ◄──────► Working
//!                           │    allocate/   │
//!                           │    release     │
//!                           ▼                ▼
//!                         Invalid ◄──────────┘ (exec ttl / forced removal)
//!                           │
//!                           ▼
//!                       Destroyed (stopped, out of the pool, replaced)
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Workers**       | Process handle, lifecycle state, resource usage.             | [`Worker`], [`StateCell`], [`ProcessWorker`]|
//! | **Pools**         | Fixed-size pool with allocation, recycling and replenishment.| [`Pool`], [`StaticPool`], [`Factory`]       |
//! | **Supervision**   | Periodic TTL / idle / memory eviction.                       | [`Supervisor`], [`Eviction`]                |
//! | **Events**        | Audit trail of every decision.                               | [`Bus`], [`Event`], [`Subscribe`]           |
//! | **Errors**        | Typed errors for pools and workers.                          | [`PoolError`], [`WorkerError`]              |
//! | **Configuration** | Plain structs with zero-means-disabled fields.               | [`PoolConfig`], [`SupervisorConfig`]        |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use poolvisor::{PoolBuilder, PoolConfig, ProcessFactory, SupervisorConfig};
//! use tokio::process::Command;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let factory = Arc::new(ProcessFactory::new(|| {
//!         let mut cmd = Command::new("php");
//!         cmd.arg("worker.php");
//!         cmd
//!     }));
//!
//!     let cfg = PoolConfig {
//!         num_workers: 4,
//!         max_jobs: 1000,
//!         supervisor: Some(SupervisorConfig {
//!             ttl: Duration::from_secs(3600),
//!             idle_ttl: Duration::from_secs(300),
//!             max_worker_memory: 128,
//!             ..SupervisorConfig::default()
//!         }),
//!         ..PoolConfig::default()
//!     };
//!
//!     let pool = PoolBuilder::new(cfg, factory).build().await?;
//!     let mut events = pool.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(ev) = events.recv().await {
//!             println!("{:?} pid={:?}", ev.kind, ev.pid());
//!         }
//!     });
//!
//!     let pid = pool.exec(|worker| async move { worker.pid() }).await?;
//!     println!("served by worker {pid}");
//!
//!     pool.destroy().await;
//!     Ok(())
//! }
//! ```

mod core;
mod error;
mod events;
mod policies;
mod subscribers;
mod worker;

#[cfg(test)]
mod testing;

// ---- Public re-exports ----

pub use crate::core::{
    Pool, PoolBuilder, PoolConfig, Removal, StaticPool, SupervisedPool, Supervisor,
    SupervisorConfig, TickSummary,
};
pub use error::{PoolError, WorkerError};
pub use events::{Bus, Event, EventKind, Payload};
pub use policies::{Eviction, evaluate};
pub use subscribers::{Subscribe, SubscriberSet};
pub use worker::{
    Factory, MB, ProcessFactory, ProcessWorker, ResourceUsage, StateCell, Worker, WorkerRef,
    WorkerState,
};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
