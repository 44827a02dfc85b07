//! # procvisor
//!
//! **Procvisor** supervises OS worker processes from a master process.
//!
//! A master spawns its workers in order, waits for each to report `ready`,
//! tells it to `start`, waits for `started`, and later stops them with a
//! graceful request that escalates to `SIGKILL` after a deadline. Workers
//! that die unexpectedly can be restarted automatically up to a cap.
//! The worker side is the [`Worker`] engine: it drives the process' own
//! start/stop hooks from the master's commands and from `SIGINT`/`SIGTERM`.
//! The master is itself a [`Worker`] of its environment, so supervisors nest.
//!
//! ## Architecture
//! ```text
//!  master process                                              worker processes
//! ┌──────────────────────────────────────────────────┐
//! │ Worker("master process")                         │
//! │   start hook ─► Supervisor::start (serial)       │
//! │   stop hook  ─► Supervisor::stop  (concurrent)   │
//! │                                                  │
//! │  Supervisor                                      │     ┌──────────────────────┐
//! │   ├─ WorkerActor #0 ── ProcessChannel ───────────┼────►│ Worker("job") + Hooks│
//! │   ├─ WorkerActor #1 ── ProcessChannel ───────────┼────►│ Worker("db")  + Hooks│
//! │   │    (handshake race, kill escalation,         │     └──────────────────────┘
//! │   │     restart monitor)                         │
//! │   │        │ publish(Event)                      │
//! │   ▼        ▼                                     │
//! │  Bus ──► subscriber listener ──► SubscriberSet   │
//! │                                   ├─ LogWriter   │
//! │                                   ├─ ManagementInterface
//! │                                   └─ custom Subscribe
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ### Protocol
//! ```text
//! master                              worker
//!   │ spawn ─────────────────────────►  │
//!   │ ◄──────── {"control":{"status":"ready","title":"job"}}
//!   │ {"control":{"action":"start"}} ─► │ start hook
//!   │ ◄────── {"control":{"status":"started","title":"job"}}
//!   │            ...                    │
//!   │ {"control":{"action":"stop"}} ──► │ stop hook (deferred while busy)
//!   │ ◄────── {"control":{"status":"stopped","title":"job"}}
//!   │ ◄─────────────── exit ─────────── │
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Supervision**   | Serial start, concurrent stop, per-worker start/stop/restart | [`Supervisor`], [`WorkerHandle`]            |
//! | **Worker engine** | Hook-driven graceful start/stop inside a supervised process  | [`Worker`], [`Hooks`], [`HookFn`]           |
//! | **Channels**      | Subprocess and pool spawn strategies over one channel type   | [`SpawnTarget`], [`Fork`], [`ProcessChannel`] |
//! | **Subscriber API**| Observe worker transitions                                   | [`Subscribe`], [`Event`]                    |
//! | **Policies**      | Automatic restart cap                                        | [`RestartPolicy`]                           |
//! | **Errors**        | Typed errors with stable labels                              | [`SupervisorError`], [`WorkerError`]        |
//! | **Configuration** | Deadlines, restart policy, management interface              | [`SupervisorConfig`]                        |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use procvisor::{CommandSpec, Subscribe, Supervisor, SupervisorConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = SupervisorConfig::default().with_restarts(3);
//!
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(procvisor::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn Subscribe>> = Vec::new();
//!
//!     let sup = Supervisor::builder(
//!         [CommandSpec::new("./job-worker"), CommandSpec::new("./db-worker")],
//!         cfg,
//!     )
//!     .with_subscribers(subs)
//!     .build();
//!
//!     // Starts every worker, then stops them all on SIGINT/SIGTERM.
//!     sup.run().await?;
//!     Ok(())
//! }
//! ```
mod channel;
mod core;
mod error;
mod events;
mod policies;
mod subscribers;
mod worker;

pub mod protocol;

// ---- Public re-exports ----

pub use channel::{
    ChannelPeer, CommandSpec, Exit, Fork, ParentLink, PeerProcess, ProcessChannel, Signal,
    SpawnTarget, CHANNEL_ENV,
};
pub use core::{
    ManagementConfig, RestartCounters, Supervisor, SupervisorBuilder, SupervisorConfig,
    WorkerHandle, WorkerInfo, WorkerStatus, MASTER_TITLE,
};
pub use error::{ChannelError, HookError, ProtocolError, SupervisorError, WorkerError};
pub use events::{Bus, Event, EventKind};
pub use policies::RestartPolicy;
pub use subscribers::{ManagementInterface, Subscribe, SubscriberSet};
pub use worker::{BoxHookFuture, Hook, HookFn, Hooks, Worker, WorkerControl, WorkerEvent};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
