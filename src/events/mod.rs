//! Supervisor events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Supervisor`, `WorkerActor`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the supervisor's subscriber listener (fans out to `SubscriberSet`)
//!   and any receiver from `Supervisor::subscribe()`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
