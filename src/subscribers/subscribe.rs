//! # Event handler trait.
//!
//! `Subscribe` is the extension point for plugging custom event handlers
//! (logging, metrics, orchestration) into a pool. Each subscriber is driven by
//! a dedicated worker loop fed by a bounded queue owned by the
//! [`SubscriberSet`](crate::SubscriberSet).
//!
//! ## Guarantees for implementors
//! - `on_event` may take its time; the pool and other subscribers keep going.
//! - If a subscriber's queue overflows, events for that subscriber are
//!   **dropped** and a `SubscriberOverflow` event is published.
//!
//! ## Example
//! ```rust
//! use poolvisor::{Event, EventKind, Subscribe};
//!
//! struct Evictions;
//!
//! #[async_trait::async_trait]
//! impl Subscribe for Evictions {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind.is_eviction() {
//!             // bump a counter...
//!         }
//!     }
//!     fn name(&self) -> &'static str { "evictions" }
//! }
//! ```

use crate::events::Event;
use async_trait::async_trait;

/// Receives pool and supervisor events.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Called once per delivered event, in emission order.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow and panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Events buffered for this subscriber before new ones are dropped.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
