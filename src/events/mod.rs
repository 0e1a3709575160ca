//! Pool events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to the events emitted by the pool and its supervisor.
//!
//! ## Contents
//! - [`EventKind`], [`Event`], [`Payload`] event classification and payload
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `StaticPool` (construct/destruct/exec-ttl/allocation),
//!   `Supervisor` (ttl/idle-ttl/max-memory/supervisor errors),
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: any [`Bus::subscribe`] receiver and the fan-out listener
//!   that feeds [`SubscriberSet`](crate::SubscriberSet).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind, Payload};
