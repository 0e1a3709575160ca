//! # LogWriter: tracing-backed event printer
//!
//! A minimal subscriber that renders incoming [`Event`]s through `tracing`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO poolvisor: worker evicted kind=Ttl pid=4211 seq=17
//! INFO poolvisor: worker destroyed pid=4211 seq=18
//! INFO poolvisor: worker constructed pid=4230 seq=19
//! WARN poolvisor: supervisor error error=worker 4190 did not stop within 60s: ... seq=20
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let pid = e.pid();
        match e.kind {
            EventKind::Ttl | EventKind::IdleTtl | EventKind::MaxMemory | EventKind::ExecTtl => {
                tracing::info!(kind = ?e.kind, pid, seq = e.seq, "worker evicted");
            }
            EventKind::MaxJobsReached => {
                tracing::info!(pid, seq = e.seq, "worker recycled after max jobs");
            }
            EventKind::Destruct => {
                tracing::info!(pid, seq = e.seq, "worker destroyed");
            }
            EventKind::WorkerConstructed => {
                tracing::info!(pid, seq = e.seq, "worker constructed");
            }
            EventKind::PoolDestroyed => {
                tracing::info!(seq = e.seq, "pool destroyed");
            }
            EventKind::SupervisorError | EventKind::AllocationFailed | EventKind::NoFreeWorkers => {
                match e.error() {
                    Some(err) => {
                        tracing::warn!(kind = ?e.kind, error = %err, seq = e.seq, "pool error")
                    }
                    None => tracing::warn!(kind = ?e.kind, seq = e.seq, "pool error"),
                }
            }
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {
                tracing::warn!(
                    kind = ?e.kind,
                    reason = e.reason.as_deref().unwrap_or("unknown"),
                    seq = e.seq,
                    "subscriber problem"
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
