//! # Worker lifecycle state.
//!
//! ```text
//! Inactive ──► Ready ◄──► Working
//!    │           │           │
//!    └───────────┼───────────┴──► Invalid ──► Destroyed
//!                └──────────────────────────► Destroyed
//! ```
//!
//! - `Ready ⇄ Working` may cycle indefinitely.
//! - Any live state may become `Invalid` (fault or pending removal) or `Destroyed`.
//! - `Destroyed` is terminal.
//!
//! [`StateCell`] stores the state in a `tokio::sync::watch` channel so transitions
//! are atomic and removal code can await a worker leaving `Working`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    /// Spawned, not yet ready to accept work.
    Inactive,
    /// Idle and allocatable.
    Ready,
    /// Handling a unit of work.
    Working,
    /// Excluded from allocation and supervision.
    Invalid,
    /// Terminated and removed from its pool.
    Destroyed,
}

impl WorkerState {
    /// Whether `self → to` is an allowed transition.
    pub fn can_transition(self, to: WorkerState) -> bool {
        use WorkerState::*;
        match (self, to) {
            (Destroyed, _) => false,
            (_, Destroyed) => true,
            (Invalid, _) => false,
            (_, Invalid) => true,
            (Inactive, Ready) | (Ready, Working) | (Working, Ready) => true,
            _ => false,
        }
    }

    /// Short stable label for logs/metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Inactive => "inactive",
            WorkerState::Ready => "ready",
            WorkerState::Working => "working",
            WorkerState::Invalid => "invalid",
            WorkerState::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, atomically updated lifecycle record of one worker.
///
/// - `created` is fixed at construction.
/// - `last_used` starts at `created` and only moves forward, on every
///   `Working → Ready` transition.
pub struct StateCell {
    state: watch::Sender<WorkerState>,
    created: Instant,
    /// Nanoseconds after `created`.
    last_used: AtomicU64,
    num_execs: AtomicU64,
}

impl StateCell {
    /// Creates a cell in `initial` state, stamped with the current time.
    pub fn new(initial: WorkerState) -> Self {
        let (state, _rx) = watch::channel(initial);
        Self {
            state,
            created: Instant::now(),
            last_used: AtomicU64::new(0),
            num_execs: AtomicU64::new(0),
        }
    }

    /// Current state (snapshot).
    pub fn value(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Creation timestamp.
    pub fn created(&self) -> Instant {
        self.created
    }

    /// Time the worker last returned to `Ready`, or `created` if it never worked.
    pub fn last_used(&self) -> Instant {
        self.created + Duration::from_nanos(self.last_used.load(Ordering::Acquire))
    }

    /// Number of completed units of work.
    pub fn num_execs(&self) -> u64 {
        self.num_execs.load(Ordering::Acquire)
    }

    /// Moves to `to` if the transition is allowed from the current state.
    ///
    /// Returns the previous state on success, the current one on rejection.
    pub fn transition(&self, to: WorkerState) -> Result<WorkerState, WorkerState> {
        let mut outcome = Err(to);
        self.state.send_if_modified(|s| {
            if s.can_transition(to) {
                outcome = Ok(*s);
                *s = to;
                true
            } else {
                outcome = Err(*s);
                false
            }
        });
        outcome
    }

    /// Moves `from → to` only if the current state is exactly `from`.
    pub fn compare_and_set(&self, from: WorkerState, to: WorkerState) -> bool {
        self.state.send_if_modified(|s| {
            if *s == from && from.can_transition(to) {
                *s = to;
                true
            } else {
                false
            }
        })
    }

    /// Finishes a unit of work: `Working → Ready`, bumping `last_used` and `num_execs`.
    ///
    /// Returns `false` (and records nothing) when the worker was not `Working`.
    pub fn finish_exec(&self) -> bool {
        self.state.send_if_modified(|s| {
            if *s != WorkerState::Working {
                return false;
            }
            let since = Instant::now().saturating_duration_since(self.created);
            let nanos = u64::try_from(since.as_nanos()).unwrap_or(u64::MAX);
            self.last_used.fetch_max(nanos, Ordering::AcqRel);
            self.num_execs.fetch_add(1, Ordering::AcqRel);
            *s = WorkerState::Ready;
            true
        })
    }

    /// Moves to `Invalid` unless the worker is `Working`.
    ///
    /// Returns `true` when the worker is `Invalid` afterwards.
    pub(crate) fn invalidate_if_idle(&self) -> bool {
        let mut invalid = false;
        self.state.send_if_modified(|s| match *s {
            WorkerState::Invalid => {
                invalid = true;
                false
            }
            WorkerState::Working | WorkerState::Destroyed => false,
            _ => {
                *s = WorkerState::Invalid;
                invalid = true;
                true
            }
        });
        invalid
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }
}

impl fmt::Debug for StateCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateCell")
            .field("state", &self.value())
            .field("num_execs", &self.num_execs())
            .finish()
    }
}
