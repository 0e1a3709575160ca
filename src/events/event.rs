//! # Events emitted by the pool and its supervisor.
//!
//! [`EventKind`] groups what can happen into three families:
//! - **Eviction events**: supervisor policy actions (ttl, idle ttl, max memory)
//! - **Pool events**: worker construction/destruction, exec ttl, allocation failures
//! - **Internal events**: supervisor errors, subscriber overflow/panic
//!
//! The [`Event`] struct carries a [`Payload`]: the affected worker, an error,
//! or nothing.
//!
//! ## Ordering guarantees
//! Every event takes the next value of a process-wide counter as its `seq`.
//! Sort by `seq` when subscribers see events out of publication order.
//!
//! ## Example
//! ```rust
//! use poolvisor::{Event, EventKind, PoolError};
//!
//! let ev = Event::new(EventKind::SupervisorError)
//!     .with_error(PoolError::Destroyed);
//!
//! assert_eq!(ev.kind, EventKind::SupervisorError);
//! assert!(ev.error().is_some());
//! assert_eq!(ev.pid(), None);
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::error::PoolError;
use crate::worker::WorkerRef;

/// Source of `Event::seq`.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of pool events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Supervisor evictions ===
    /// Worker was removed because it outlived the configured TTL.
    ///
    /// Payload: the removed worker.
    Ttl,

    /// Ready worker was removed because it stayed idle past the idle TTL.
    ///
    /// Payload: the removed worker.
    IdleTtl,

    /// Worker was removed because its memory reached the per-worker ceiling.
    ///
    /// Payload: the removed worker.
    MaxMemory,

    /// Removal failed inside a supervision tick; the rest of the tick was skipped.
    ///
    /// Payload: the removal error.
    SupervisorError,

    // === Pool lifecycle ===
    /// Worker was terminated and left the pool (`Destroyed`).
    ///
    /// Payload: the destroyed worker.
    Destruct,

    /// Worker was spawned by the factory and joined the pool.
    ///
    /// Payload: the new worker.
    WorkerConstructed,

    /// The factory could not produce a replacement worker.
    ///
    /// Payload: the allocation error.
    AllocationFailed,

    /// A unit of work exceeded the exec TTL; the worker was removed.
    ///
    /// Payload: the removed worker.
    ExecTtl,

    /// No worker became free within the allocate timeout.
    ///
    /// Payload: the timeout error.
    NoFreeWorkers,

    /// Worker reached `max_jobs` executions and was recycled.
    ///
    /// Payload: the recycled worker.
    MaxJobsReached,

    /// Pool was destroyed; every worker has been stopped.
    PoolDestroyed,

    // === Subscriber events ===
    /// A subscriber queue was full or closed and an event was lost.
    ///
    /// Sets `reason`: `subscriber=<name> reason=<full|closed>`.
    SubscriberOverflow,

    /// A subscriber panicked inside `on_event`.
    ///
    /// Sets `reason`: panic message.
    SubscriberPanicked,
}

impl EventKind {
    /// True for the kinds a supervisor tick emits when it evicts a worker.
    pub fn is_eviction(&self) -> bool {
        matches!(self, EventKind::Ttl | EventKind::IdleTtl | EventKind::MaxMemory)
    }
}

/// What an event is about.
#[derive(Clone, Default)]
pub enum Payload {
    /// No payload.
    #[default]
    None,
    /// The affected worker.
    Worker(WorkerRef),
    /// The error being reported.
    Error(Arc<PoolError>),
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::None => f.write_str("None"),
            Payload::Worker(w) => f.debug_tuple("Worker").field(&w.pid()).finish(),
            Payload::Error(e) => f.debug_tuple("Error").field(e).finish(),
        }
    }
}

/// Pool event with payload.
///
/// - `seq`: publication order across the process
/// - `at`: system time at construction, for display
#[derive(Clone, Debug)]
pub struct Event {
    /// Process-wide publication order.
    pub seq: u64,
    /// System time at construction.
    pub at: SystemTime,
    /// What happened.
    pub kind: EventKind,
    /// Affected worker or error.
    pub payload: Payload,
    /// Human-readable detail (subscriber name, panic message, ...).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            payload: Payload::None,
            reason: None,
        }
    }

    /// Attaches the affected worker.
    #[inline]
    pub fn with_worker(mut self, worker: &WorkerRef) -> Self {
        self.payload = Payload::Worker(Arc::clone(worker));
        self
    }

    /// Attaches an error.
    #[inline]
    pub fn with_error(mut self, err: impl Into<Arc<PoolError>>) -> Self {
        self.payload = Payload::Error(err.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Process id of the worker in the payload, if any.
    pub fn pid(&self) -> Option<u32> {
        match &self.payload {
            Payload::Worker(w) => Some(w.pid()),
            _ => None,
        }
    }

    /// Worker in the payload, if any.
    pub fn worker(&self) -> Option<&WorkerRef> {
        match &self.payload {
            Payload::Worker(w) => Some(w),
            _ => None,
        }
    }

    /// Error in the payload, if any.
    pub fn error(&self) -> Option<&PoolError> {
        match &self.payload {
            Payload::Error(e) => Some(e.as_ref()),
            _ => None,
        }
    }

    /// Reports an event that a subscriber could not queue.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Reports a subscriber that panicked.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} panic={info}"))
    }
}
