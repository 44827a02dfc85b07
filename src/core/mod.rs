//! Supervisor core: worker slots and their lifecycle.
//!
//! The public API from this module is [`Supervisor`] (built through
//! [`SupervisorBuilder`]), [`WorkerHandle`] for per-worker operations, and the
//! introspection types [`WorkerInfo`], [`WorkerStatus`], [`RestartCounters`].
//!
//! Internal modules:
//! - [`actor`]: owns one worker slot (channel, timers, counters) and serves its requests;
//! - [`handshake`]: the deadline/status/exit/request race used for each handshake step;
//! - [`supervisor`]: serial start, concurrent stop, event fan-out;
//! - [`config`]: [`SupervisorConfig`] and [`ManagementConfig`].

mod actor;
mod builder;
mod config;
mod handle;
mod handshake;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use config::{ManagementConfig, SupervisorConfig};
pub use handle::{RestartCounters, WorkerHandle, WorkerInfo, WorkerStatus};
pub use supervisor::{Supervisor, MASTER_TITLE};
