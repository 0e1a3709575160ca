//! # Pool and supervisor configuration.
//!
//! Provides [`PoolConfig`] and [`SupervisorConfig`], plain value structs. How
//! the numbers arrive (files, env, flags) is up to the caller.
//!
//! ## Sentinel values
//! - `max_jobs = 0` → unlimited executions per worker
//! - `ttl`, `idle_ttl`, `exec_ttl = 0s` → policy disabled
//! - `max_worker_memory`, `max_pool_memory = 0` → ceiling disabled
//!
//! ## Validation
//! [`PoolConfig::validate`] / [`SupervisorConfig::validate`] run at construction
//! time and reject values that would make the pool or the control loop unusable.

use std::time::Duration;

use crate::error::PoolError;
use crate::worker::MB;

/// Worker pool configuration.
///
/// ## Field semantics
/// - `num_workers`: fixed pool size (min 1)
/// - `max_jobs`: executions before a worker is recycled (`0` = unlimited)
/// - `allocate_timeout`: how long `allocate` waits for a free worker
/// - `destroy_timeout`: bound on graceful removal before a worker is killed
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `supervisor`: eviction policy; `None` runs the pool unsupervised
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Number of workers kept alive.
    pub num_workers: usize,
    /// Executions after which a worker is recycled (`0` = unlimited).
    pub max_jobs: u64,
    /// Maximum wait for a free worker.
    pub allocate_timeout: Duration,
    /// Maximum time a removal waits for the worker to go idle and exit.
    pub destroy_timeout: Duration,
    /// Capacity of the event bus broadcast channel.
    pub bus_capacity: usize,
    /// Supervision policy.
    pub supervisor: Option<SupervisorConfig>,
}

impl PoolConfig {
    /// Returns the recycle threshold as an `Option`.
    #[inline]
    pub fn max_jobs(&self) -> Option<u64> {
        (self.max_jobs != 0).then_some(self.max_jobs)
    }

    /// Exec TTL from the supervisor section, if any.
    #[inline]
    pub fn exec_ttl(&self) -> Option<Duration> {
        self.supervisor.as_ref().and_then(SupervisorConfig::exec_ttl)
    }

    /// Checks every field; nested supervisor config included.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.num_workers == 0 {
            return Err(invalid("num_workers", "must be at least 1"));
        }
        if self.allocate_timeout.is_zero() {
            return Err(invalid("allocate_timeout", "must be greater than zero"));
        }
        if self.destroy_timeout.is_zero() {
            return Err(invalid("destroy_timeout", "must be greater than zero"));
        }
        if let Some(sv) = &self.supervisor {
            sv.validate()?;
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    /// Default configuration:
    ///
    /// - `num_workers` = available parallelism (1 if unknown)
    /// - `max_jobs = 0` (unlimited)
    /// - `allocate_timeout = 60s`, `destroy_timeout = 60s`
    /// - `bus_capacity = 1024`
    /// - `supervisor = None`
    fn default() -> Self {
        Self {
            num_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            max_jobs: 0,
            allocate_timeout: Duration::from_secs(60),
            destroy_timeout: Duration::from_secs(60),
            bus_capacity: 1024,
            supervisor: None,
        }
    }
}

/// Eviction policy enforced by the [`Supervisor`](crate::Supervisor).
///
/// Immutable once the supervisor is built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Control-loop period.
    pub watch_tick: Duration,
    /// Maximum worker age (`0s` = disabled).
    pub ttl: Duration,
    /// Maximum idle time of a `Ready` worker (`0s` = disabled).
    pub idle_ttl: Duration,
    /// Maximum duration of one unit of work (`0s` = disabled); enforced by the pool.
    pub exec_ttl: Duration,
    /// Per-worker memory ceiling in MB (`0` = disabled).
    pub max_worker_memory: u64,
    /// Pool-wide memory ceiling in MB (`0` = disabled); aggregated but not enforced.
    pub max_pool_memory: u64,
}

impl SupervisorConfig {
    /// Worker TTL, if enabled.
    #[inline]
    pub fn ttl(&self) -> Option<Duration> {
        (!self.ttl.is_zero()).then_some(self.ttl)
    }

    /// Idle TTL, if enabled.
    #[inline]
    pub fn idle_ttl(&self) -> Option<Duration> {
        (!self.idle_ttl.is_zero()).then_some(self.idle_ttl)
    }

    /// Exec TTL, if enabled.
    #[inline]
    pub fn exec_ttl(&self) -> Option<Duration> {
        (!self.exec_ttl.is_zero()).then_some(self.exec_ttl)
    }

    /// Per-worker ceiling in bytes, if enabled.
    #[inline]
    pub fn max_worker_memory_bytes(&self) -> Option<u64> {
        (self.max_worker_memory != 0).then(|| self.max_worker_memory.saturating_mul(MB))
    }

    /// Pool-wide ceiling in bytes, if enabled.
    #[inline]
    pub fn max_pool_memory_bytes(&self) -> Option<u64> {
        (self.max_pool_memory != 0).then(|| self.max_pool_memory.saturating_mul(MB))
    }

    /// Rejects a zero `watch_tick`.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.watch_tick.is_zero() {
            return Err(invalid("watch_tick", "must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for SupervisorConfig {
    /// `watch_tick = 1s`, every policy disabled.
    fn default() -> Self {
        Self {
            watch_tick: Duration::from_secs(1),
            ttl: Duration::ZERO,
            idle_ttl: Duration::ZERO,
            exec_ttl: Duration::ZERO,
            max_worker_memory: 0,
            max_pool_memory: 0,
        }
    }
}

fn invalid(field: &'static str, reason: &'static str) -> PoolError {
    PoolError::ConfigInvalid { field, reason }
}
