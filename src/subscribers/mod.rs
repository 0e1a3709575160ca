//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! used by [`PoolBuilder`](crate::PoolBuilder), and (with the `logging`
//! feature) the built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! StaticPool / Supervisor ── publish(Event) ──► Bus ──► fan-out listener
//!                                                           │
//!                                                  SubscriberSet::emit(&Event)
//!                                                ┌──────────┼──────────┐
//!                                                ▼          ▼          ▼
//!                                            LogWriter   Metrics    Custom
//! ```

mod set;
mod subscribe;

#[cfg(feature = "logging")]
mod log;

pub use set::SubscriberSet;
pub use subscribe::Subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
