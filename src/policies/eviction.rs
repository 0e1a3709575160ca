//! # Eviction decision for one worker.
//!
//! Checks run in a fixed order and the first violation wins, so a worker is
//! never attributed to two policies in the same tick:
//!
//! 1. **TTL**: `now - created >= ttl`
//! 2. **Max memory**: `memory_bytes >= max_worker_memory * MB`
//! 3. **Idle TTL**: only for `Ready` workers, `now - last_used >= idle_ttl`
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use poolvisor::{Eviction, EventKind};
//!
//! assert_eq!(Eviction::Ttl.event_kind(), EventKind::Ttl);
//! assert_eq!(Eviction::MaxMemory.as_str(), "max_memory");
//! ```

use tokio::time::Instant;

use crate::core::SupervisorConfig;
use crate::events::EventKind;
use crate::worker::{ResourceUsage, Worker, WorkerState};

/// Policy a worker violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eviction {
    /// Worker outlived `ttl`.
    Ttl,
    /// Worker reached `max_worker_memory`.
    MaxMemory,
    /// Ready worker stayed idle for `idle_ttl`.
    IdleTtl,
}

impl Eviction {
    /// Event kind published after a successful eviction.
    pub fn event_kind(self) -> EventKind {
        match self {
            Eviction::Ttl => EventKind::Ttl,
            Eviction::MaxMemory => EventKind::MaxMemory,
            Eviction::IdleTtl => EventKind::IdleTtl,
        }
    }

    /// Short stable label for logs/metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Eviction::Ttl => "ttl",
            Eviction::MaxMemory => "max_memory",
            Eviction::IdleTtl => "idle_ttl",
        }
    }
}

/// Returns the first policy `worker` violates at `now`, if any.
pub fn evaluate(
    cfg: &SupervisorConfig,
    worker: &dyn Worker,
    usage: &ResourceUsage,
    now: Instant,
) -> Option<Eviction> {
    if let Some(ttl) = cfg.ttl() {
        if now.saturating_duration_since(worker.created()) >= ttl {
            return Some(Eviction::Ttl);
        }
    }

    if let Some(limit) = cfg.max_worker_memory_bytes() {
        if usage.memory_bytes >= limit {
            return Some(Eviction::MaxMemory);
        }
    }

    if let Some(idle_ttl) = cfg.idle_ttl() {
        if worker.state().value() == WorkerState::Ready
            && now.saturating_duration_since(worker.last_used()) >= idle_ttl
        {
            return Some(Eviction::IdleTtl);
        }
    }

    None
}
