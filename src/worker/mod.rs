//! # Worker side of the protocol.
//!
//! - [`Worker`] runs inside a supervised process and drives its [`Hooks`].
//! - [`WorkerControl`] lets application code mark the worker busy and request a stop.
//! - [`WorkerEvent`] are the local lifecycle notifications.

mod engine;
mod hooks;
mod signals;

pub use engine::{Worker, WorkerControl, WorkerEvent};
pub use hooks::{BoxHookFuture, Hook, HookFn, Hooks};
