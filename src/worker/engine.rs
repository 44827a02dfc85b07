//! # Worker: the protocol engine running inside every supervised process.
//!
//! Turns OS termination signals and parent commands into calls of the user's
//! [`Hooks`], and reports progress back to the parent.
//!
//! ## States
//! ```text
//!            parent link                         no parent link
//! Init ──► send ready ──► WaitingForCommand     Init ──► start hook ──► Running
//!                              │ start command
//!                              ▼
//!                         start hook ──► send started ──► Running
//!
//! Running ──► stop command | SIGINT | SIGTERM | request_stop()
//!         ──► (deferred while busy or while the start hook runs)
//!         ──► Stopping: drop listeners ─► stop hook ─► send stopped ─► emit ─► disconnect
//!         ──► Terminated
//! ```
//!
//! ## Rules
//! - At most one stop sequence ever runs; later stop requests are ignored.
//! - Losing the parent before the stop hook completed is fatal: the process exits with
//!   status 1 without finishing the stop sequence (see [`Worker::exit_on_parent_lost`]).
//!   This holds while a stop is deferred and while the stop hook runs.
//! - No timeouts live here; the supervisor owns every deadline.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, warn};

use super::hooks::{BoxHookFuture, Hooks};
use super::signals::ShutdownSignals;
use crate::channel::{stdio_link, ParentLink, Signal, CHANNEL_ENV};
use crate::error::{HookError, WorkerError};
use crate::protocol::{Action, Command, Status, StatusKind};

/// Local lifecycle notifications of a [`Worker`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Ready status sent; waiting for the parent's start command.
    Ready,
    /// Start hook completed.
    Started,
    /// Stop hook completed.
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    WaitingForCommand,
    Starting,
    Running,
}

#[derive(Debug)]
enum ControlMsg {
    Working(bool),
    Stop,
}

/// Handle used by application code while a [`Worker`] runs.
#[derive(Clone, Debug)]
pub struct WorkerControl {
    tx: mpsc::UnboundedSender<ControlMsg>,
}

impl WorkerControl {
    /// Marks the worker busy/idle. A stop requested while busy runs once the
    /// worker goes idle again.
    pub fn working(&self, busy: bool) {
        let _ = self.tx.send(ControlMsg::Working(busy));
    }

    /// Requests a stop, exactly as a `SIGTERM` would.
    pub fn request_stop(&self) {
        let _ = self.tx.send(ControlMsg::Stop);
    }
}

/// Graceful protocol engine for one process.
pub struct Worker {
    title: Arc<str>,
    hooks: Arc<dyn Hooks>,
    events: broadcast::Sender<WorkerEvent>,
    control_tx: mpsc::UnboundedSender<ControlMsg>,
    control_rx: mpsc::UnboundedReceiver<ControlMsg>,
    exit_on_parent_lost: bool,
    os_signals: bool,
}

impl Worker {
    pub fn new(title: impl Into<Arc<str>>, hooks: Arc<dyn Hooks>) -> Self {
        let (events, _) = broadcast::channel(16);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        Self {
            title: title.into(),
            hooks,
            events,
            control_tx,
            control_rx,
            exit_on_parent_lost: true,
            os_signals: true,
        }
    }

    /// Whether losing the parent terminates the process (`true`, default) or
    /// makes [`run`](Self::run) return [`WorkerError::ParentLost`].
    pub fn exit_on_parent_lost(mut self, exit: bool) -> Self {
        self.exit_on_parent_lost = exit;
        self
    }

    /// Whether to listen for `SIGINT`/`SIGTERM` (default `true`).
    pub fn handle_os_signals(mut self, enabled: bool) -> Self {
        self.os_signals = enabled;
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn control(&self) -> WorkerControl {
        WorkerControl {
            tx: self.control_tx.clone(),
        }
    }

    /// Subscribes to local lifecycle events. Subscribe before calling `run`.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    /// Runs the engine, talking to the parent over stdio when this process was
    /// spawned by a supervisor, standalone otherwise.
    pub async fn run(self) -> Result<(), WorkerError> {
        let link = std::env::var_os(CHANNEL_ENV).map(|_| stdio_link());
        self.run_with(link).await
    }

    /// Runs the engine over an explicit link (`None` = standalone, self-start).
    pub async fn run_with(mut self, mut link: Option<ParentLink>) -> Result<(), WorkerError> {
        let mut signals = if self.os_signals {
            Some(ShutdownSignals::install().map_err(WorkerError::Signals)?)
        } else {
            None
        };

        let mut busy = false;
        let mut exit_asked = false;
        let mut starting: Option<BoxHookFuture> = None;

        let mut state = match &link {
            Some(parent) => {
                self.report(parent, StatusKind::Ready);
                self.emit(WorkerEvent::Ready);
                State::WaitingForCommand
            }
            None => {
                debug!(title = %self.title, "no parent, starting on our own");
                starting = Some(self.start_hook());
                State::Starting
            }
        };

        loop {
            if exit_asked && !busy && starting.is_none() {
                break;
            }

            tokio::select! {
                res = drive(&mut starting) => {
                    starting = None;
                    if let Err(e) = res {
                        error!(title = %self.title, error = %e, "start hook failed");
                        return Err(WorkerError::Hook(e));
                    }
                    if let Some(parent) = &link {
                        self.report(parent, StatusKind::Started);
                    }
                    state = State::Running;
                    self.emit(WorkerEvent::Started);
                }
                signal = next_signal(&mut signals), if !exit_asked => {
                    debug!(title = %self.title, %signal, "termination signal received");
                    exit_asked = ask_exit(&self.title, exit_asked);
                }
                command = next_command(&mut link) => match command {
                    Some(command) if exit_asked => {
                        debug!(title = %self.title, action = ?command.action, "stopping, command ignored");
                    }
                    Some(Command { action: Action::Start }) => {
                        if state == State::WaitingForCommand {
                            starting = Some(self.start_hook());
                            state = State::Starting;
                        } else {
                            warn!(title = %self.title, ?state, "ignoring start command");
                        }
                    }
                    Some(Command { action: Action::Stop }) => {
                        exit_asked = ask_exit(&self.title, exit_asked);
                    }
                    None => return self.parent_lost(),
                },
                Some(msg) = self.control_rx.recv() => match msg {
                    ControlMsg::Working(b) => busy = b,
                    ControlMsg::Stop => exit_asked = ask_exit(&self.title, exit_asked),
                },
            }
        }

        debug!(title = %self.title, from = ?state, "stopping");
        drop(signals);
        let hooks = Arc::clone(&self.hooks);
        let mut stopping = hooks.stop();
        let res = loop {
            tokio::select! {
                res = &mut stopping => break res,
                command = next_command(&mut link) => match command {
                    Some(command) => {
                        debug!(title = %self.title, action = ?command.action, "stopping, command ignored");
                    }
                    None => return self.parent_lost(),
                },
            }
        };
        if let Err(e) = &res {
            error!(title = %self.title, error = %e, "stop hook failed");
        }
        if let Some(parent) = &link {
            self.report(parent, StatusKind::Stopped);
        }
        self.emit(WorkerEvent::Stopped);
        if let Some(parent) = link.take() {
            parent.close().await;
        }
        debug!(title = %self.title, "terminated");
        res.map_err(WorkerError::Hook)
    }

    /// The parent's end of the link closed before our stop sequence finished.
    fn parent_lost(&self) -> Result<(), WorkerError> {
        error!(title = %self.title, "master process died, forced exit");
        if self.exit_on_parent_lost {
            std::process::exit(1);
        }
        Err(WorkerError::ParentLost)
    }

    fn start_hook(&self) -> BoxHookFuture {
        let hooks = Arc::clone(&self.hooks);
        Box::pin(async move { hooks.start().await })
    }

    fn report(&self, parent: &ParentLink, status: StatusKind) {
        if let Err(e) = parent.send(Status::new(status, self.title.as_ref())) {
            warn!(title = %self.title, status = status.as_str(), error = %e, "cannot report status");
        }
    }

    fn emit(&self, ev: WorkerEvent) {
        let _ = self.events.send(ev);
    }
}

fn ask_exit(title: &str, already: bool) -> bool {
    if already {
        debug!(%title, "stop already requested");
    }
    true
}

async fn drive(starting: &mut Option<BoxHookFuture>) -> Result<(), HookError> {
    match starting {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn next_signal(signals: &mut Option<ShutdownSignals>) -> Signal {
    match signals {
        Some(s) => s.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_command(link: &mut Option<ParentLink>) -> Option<Command> {
    match link {
        Some(parent) => parent.recv().await,
        None => std::future::pending().await,
    }
}
