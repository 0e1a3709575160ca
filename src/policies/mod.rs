//! Eviction policies.
//!
//! This module groups the rules that decide **whether** a supervised worker
//! must be recycled and **which** policy gets the credit.
//!
//! ## Contents
//! - [`Eviction`] the policy a worker violated
//! - [`evaluate`] precedence-ordered check: TTL → max memory → idle TTL
//!
//! ## Quick wiring
//! ```text
//! SupervisorConfig { ttl, idle_ttl, max_worker_memory, .. }
//!      └─► Supervisor::tick() per worker:
//!           - evaluate(cfg, worker, usage, now) → Option<Eviction>
//!           - Some(e) → Pool::remove_worker, publish e.event_kind()
//! ```

mod eviction;

pub use eviction::{Eviction, evaluate};
