//! # Supervisor: owns the worker slots, fans events out, drives start/stop.
//!
//! The [`Supervisor`] owns the event bus, a [`SubscriberSet`], one
//! [`WorkerActor`](super::actor::WorkerActor) per spawn target and the
//! `shutting_down` flag shared with them.
//!
//! ## High-level architecture
//! ```text
//! build():
//!   targets[0] targets[1] ... targets[N-1]
//!       └──► WorkerActor::spawn(id, target, cfg, bus, shutting_down, token) ─► WorkerHandle
//!   subscriber_listener(): Bus.subscribe() ─► SubscriberSet::emit(Event)
//!
//! start():  on_start hook ─► handle[0].start() ─► handle[1].start() ─► ... (serial, failures skipped)
//!                         └─► publish SupervisorStarted
//!
//! stop():   shutting_down = true (once) ─► on_stop hook
//!                                       └─► join_all(handle[i].stop()) (concurrent)
//!                                       └─► publish SupervisorStopped
//!
//! run():    Worker("master process") { start: start(), stop: stop() }
//!             └─► SIGINT/SIGTERM or a parent's stop command ─► stop()
//! ```
//!
//! ## Example
//! ```no_run
//! use procvisor::{Supervisor, SupervisorConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = SupervisorConfig::default().with_restarts(3);
//!     let sup = Supervisor::builder(["target/debug/examples/job_worker"], cfg).build();
//!     sup.run().await?;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::builder::SupervisorBuilder;
use super::config::SupervisorConfig;
use super::handle::{WorkerHandle, WorkerInfo};
use crate::channel::SpawnTarget;
use crate::error::{HookError, SupervisorError, WorkerError};
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::{ManagementInterface, SubscriberSet};
use crate::worker::{Hook, Hooks, Worker};

/// Title the supervisor reports to its own parent.
pub const MASTER_TITLE: &str = "master process";

/// Coordinates worker actors, event delivery and the start/stop sequences.
pub struct Supervisor {
    cfg: SupervisorConfig,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    workers: Vec<WorkerHandle>,
    on_start: Hook,
    on_stop: Hook,
    shutting_down: Arc<AtomicBool>,
    management: Option<Arc<ManagementInterface>>,
    token: CancellationToken,
}

impl Supervisor {
    /// Starts building a supervisor for `targets`, started in the given order.
    pub fn builder<I, T>(targets: I, cfg: SupervisorConfig) -> SupervisorBuilder
    where
        I: IntoIterator<Item = T>,
        T: Into<SpawnTarget>,
    {
        SupervisorBuilder::new(targets.into_iter().map(Into::into).collect(), cfg)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_internal(
        cfg: SupervisorConfig,
        bus: Bus,
        subs: Arc<SubscriberSet>,
        workers: Vec<WorkerHandle>,
        on_start: Hook,
        on_stop: Hook,
        shutting_down: Arc<AtomicBool>,
        management: Option<Arc<ManagementInterface>>,
        token: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            bus,
            subs,
            workers,
            on_start,
            on_stop,
            shutting_down,
            management,
            token,
        }
    }

    /// Runs the start hook, then starts every worker in order.
    ///
    /// A worker that fails its handshake is reported through a
    /// [`EventKind::WorkerError`] event and skipped; the sequence continues.
    /// Workers that already run are left alone. A failing start hook or a
    /// worker slot that no longer answers fails the call.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        self.on_start.call().await?;
        debug!(workers = self.workers.len(), "starting master");

        for worker in &self.workers {
            if self.is_shutting_down() {
                debug!("shutdown requested, not starting remaining workers");
                break;
            }
            match worker.start().await {
                Ok(()) => {}
                Err(SupervisorError::AlreadyStarted) => {
                    debug!(worker = worker.id(), "worker already running");
                }
                Err(e) if e.is_start_failure() => {
                    debug!(worker = worker.id(), error = %e, "worker failed to start, continuing");
                }
                Err(e) => {
                    warn!(worker = worker.id(), error = %e, "cannot start worker, aborting");
                    return Err(e);
                }
            }
        }

        info!(workers = self.workers.len(), "master started");
        self.bus.publish(Event::new(EventKind::SupervisorStarted));
        Ok(())
    }

    /// Marks the supervisor as shutting down, runs the stop hook and stops
    /// every worker concurrently.
    ///
    /// Workers are stopped even when the stop hook fails; the first error
    /// (hook first, then workers) is returned.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            debug!("master already shutting down");
        }
        debug!("stopping master");

        let hook = self.on_stop.call().await.map_err(SupervisorError::from);
        let results = join_all(self.workers.iter().map(|w| w.stop())).await;

        let mut first_err = hook.err();
        for (worker, res) in self.workers.iter().zip(results) {
            if let Err(e) = res {
                warn!(worker = worker.id(), error = %e, "error while stopping worker");
                first_err.get_or_insert(e);
            }
        }

        info!("all workers stopped");
        self.bus.publish(Event::new(EventKind::SupervisorStopped));
        first_err.map_or(Ok(()), Err)
    }

    /// Runs the supervisor as a worker of its own environment: starts, then
    /// stops on `SIGINT`/`SIGTERM` (or on a parent supervisor's stop command).
    pub async fn run(self: Arc<Self>) -> Result<(), WorkerError> {
        let hooks = Arc::new(MasterHooks {
            sup: Arc::clone(&self),
        });
        Worker::new(MASTER_TITLE, hooks).run().await
    }

    /// Snapshots of every worker slot, in start order.
    pub fn workers(&self) -> Vec<WorkerInfo> {
        self.workers.iter().map(WorkerHandle::info).collect()
    }

    pub fn worker(&self, id: usize) -> Option<&WorkerHandle> {
        self.workers.get(id)
    }

    pub fn handles(&self) -> &[WorkerHandle] {
        &self.workers
    }

    /// Raw event receiver; sees events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Management interface, when enabled in the config.
    pub fn management(&self) -> Option<Arc<ManagementInterface>> {
        self.management.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }

    /// Forwards bus events to the subscriber set until the supervisor is dropped.
    pub(crate) fn subscriber_listener(&self) {
        if self.subs.is_empty() {
            return;
        }
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        let token = self.token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    ev = rx.recv() => match ev {
                        Ok(ev) => set.emit(ev),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "subscriber listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// The supervisor's own start/stop, as seen by its [`Worker`] engine.
struct MasterHooks {
    sup: Arc<Supervisor>,
}

#[async_trait]
impl Hooks for MasterHooks {
    async fn start(&self) -> Result<(), HookError> {
        self.sup.start().await.map_err(HookError::from)
    }

    async fn stop(&self) -> Result<(), HookError> {
        self.sup.stop().await.map_err(HookError::from)
    }
}
