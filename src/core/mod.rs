//! Pool runtime: configuration, pools and supervision.
//!
//! - [`config`]: [`PoolConfig`] and [`SupervisorConfig`] with validation;
//! - [`pool`]: the [`Pool`] capability set and the fixed-size [`StaticPool`];
//! - [`supervisor`]: the periodic eviction loop;
//! - [`builder`]: [`PoolBuilder`] wiring pool, bus, subscribers and supervisor.

mod builder;
mod config;
mod pool;
mod supervisor;

pub use builder::{PoolBuilder, SupervisedPool};
pub use config::{PoolConfig, SupervisorConfig};
pub use pool::{Pool, Removal, StaticPool};
pub use supervisor::{Supervisor, TickSummary};
