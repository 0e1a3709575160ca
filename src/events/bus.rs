//! # Event bus for broadcasting pool events.
//!
//! [`Bus`] wraps a [`tokio::sync::broadcast`] sender. The pool, the supervisor
//! and the subscriber fan-out all publish through clones of the same bus.
//!
//! ## Flow
//! ```text
//! Publishers (many):                   Receivers (many):
//!   StaticPool ──┐                  ┌──► Bus::subscribe() (user code)
//!   Supervisor ──┼──────► Bus ──────┤
//!   Subscribers ─┘  (broadcast chan)└──► fan-out listener ──► SubscriberSet
//! ```
//!
//! ## Behaviour
//! - `publish()` returns immediately, whether or not anyone is listening.
//! - All receivers read from one ring buffer of `capacity` slots.
//! - A receiver that falls behind sees `RecvError::Lagged(n)` and loses the `n` oldest events.
//! - Nothing is retained for receivers that subscribe later.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for pool events.
///
/// Multiple publishers can publish concurrently; every receiver gets a clone of
/// each event sent after it subscribed.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Bus holding up to `capacity` undelivered events.
    ///
    /// The buffer is shared by every receiver. Zero is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Sends `ev` to every current receiver.
    ///
    /// Without receivers the event is discarded.
    pub fn publish(&self, ev: Event) {
        // Err only means nobody is subscribed.
        let _ = self.tx.send(ev);
    }

    /// Receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
