//! # Worker slots as seen from outside the actor.
//!
//! A [`WorkerHandle`] is a cheap, cloneable front for one [`WorkerActor`](super::actor::WorkerActor):
//! operations are sent as requests and answered through a oneshot, the slot's
//! state is published through a `watch` channel as [`WorkerInfo`].

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use crate::channel::Exit;
use crate::error::SupervisorError;
use crate::policies::RestartPolicy;

/// Lifecycle status of a worker slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkerStatus {
    /// Registered, never spawned.
    Unknown,
    Spawned,
    Ready,
    Started,
    /// Between an automatic or manual restart and the next handshake.
    Restarting,
    Stopping,
    Stopped,
    /// Stopped by the forceful-termination signal.
    Killed,
    /// The last start attempt failed.
    Errored,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Unknown => "unknown",
            WorkerStatus::Spawned => "spawned",
            WorkerStatus::Ready => "ready",
            WorkerStatus::Started => "started",
            WorkerStatus::Restarting => "restarting",
            WorkerStatus::Stopping => "stopping",
            WorkerStatus::Stopped => "stopped",
            WorkerStatus::Killed => "killed",
            WorkerStatus::Errored => "errored",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Restart bookkeeping of a slot. Counters only grow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RestartCounters {
    pub policy: RestartPolicy,
    pub manual: u32,
    pub automatic: u32,
}

impl RestartCounters {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            manual: 0,
            automatic: 0,
        }
    }

    #[inline]
    pub fn total(&self) -> u32 {
        self.manual.saturating_add(self.automatic)
    }
}

/// Snapshot of a worker slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerInfo {
    /// Stable index assigned at registration.
    pub id: usize,
    /// Initially the target label (`[program]`), then whatever the worker reported as ready.
    pub title: Arc<str>,
    /// Label of the spawn target.
    pub target: Arc<str>,
    pub status: WorkerStatus,
    /// OS pid of the live process, if any.
    pub pid: Option<u32>,
    pub restarts: RestartCounters,
}

pub(crate) type Reply<T> = oneshot::Sender<Result<T, SupervisorError>>;

/// Operation requested from a worker actor.
#[derive(Debug)]
pub(crate) enum Request {
    Start(Reply<()>),
    Stop(Reply<Option<Exit>>),
    Restart(Reply<()>),
}

/// Cloneable handle to one supervised worker slot.
#[derive(Clone)]
pub struct WorkerHandle {
    id: usize,
    info: watch::Receiver<WorkerInfo>,
    requests: mpsc::UnboundedSender<Request>,
}

impl WorkerHandle {
    pub(crate) fn new(
        id: usize,
        info: watch::Receiver<WorkerInfo>,
        requests: mpsc::UnboundedSender<Request>,
    ) -> Self {
        Self { id, info, requests }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Current snapshot of the slot.
    pub fn info(&self) -> WorkerInfo {
        self.info.borrow().clone()
    }

    pub fn status(&self) -> WorkerStatus {
        self.info.borrow().status
    }

    pub fn title(&self) -> Arc<str> {
        Arc::clone(&self.info.borrow().title)
    }

    /// Spawns the worker and runs the ready/started handshake.
    ///
    /// Fails with [`SupervisorError::AlreadyStarted`] if a process is already live for this slot.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        self.call(Request::Start).await
    }

    /// Stops the worker: graceful request first, `SIGKILL` after the kill timeout.
    ///
    /// Returns the observed exit, or `None` when there was nothing to stop
    /// during a global shutdown.
    pub async fn stop(&self) -> Result<Option<Exit>, SupervisorError> {
        self.call(Request::Stop).await
    }

    /// Stops then starts the worker, counting a manual restart.
    pub async fn restart(&self) -> Result<(), SupervisorError> {
        self.call(Request::Restart).await
    }

    /// Waits until the slot reaches `status`.
    pub async fn wait_for(&self, status: WorkerStatus) -> Result<WorkerInfo, SupervisorError> {
        let mut rx = self.info.clone();
        let info = rx
            .wait_for(|info| info.status == status)
            .await
            .map_err(|_| SupervisorError::Closed)?;
        Ok(info.clone())
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Request) -> Result<T, SupervisorError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(make(tx))
            .map_err(|_| SupervisorError::Closed)?;
        rx.await.map_err(|_| SupervisorError::Closed)?
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.info.borrow();
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("title", &info.title)
            .field("status", &info.status)
            .finish()
    }
}
