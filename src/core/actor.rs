//! # WorkerActor: single-slot supervisor.
//!
//! Owns everything about one worker slot: the live [`ProcessChannel`], the
//! restart counters and every timer. Requests from [`WorkerHandle`]s are
//! processed one at a time, so a slot is never starting and stopping at once.
//!
//! ## Start
//! ```text
//! spawn ──► status=spawned
//!   └─► await ready   (ready_timeout)  ──► title, status=ready, emit WorkerReady, send start
//!         └─► await started (start_timeout) ──► status=started, emit WorkerStarted,
//!                                               arm restart monitor if the policy allows
//! ```
//! Each wait is a [`handshake`](super::handshake) race. Losing it:
//! - deadline: `ReadyTimeout` / `StartAckTimeout`, channel kept, status untouched
//! - unsignaled exit: `StartFailure`, channel cleared, status=errored
//! - signaled exit: stopped/killed event, `StartInterrupted`
//! - stop request: the stop runs, the start fails with `StartInterrupted`
//!
//! ## Stop
//! ```text
//! connected? ──yes──► send stop ─┐
//!            └─no───► SIGTERM ───┴─► wait exit ──(kill_timeout)──► SIGKILL (once)
//!                                       └─► channel cleared, emit WorkerStopped | WorkerKilled
//! ```
//!
//! ## Idle exits (no request in flight)
//! - supervisor shutting down: recorded, consumed by the coming stop
//!   (a restart timer firing during shutdown is dropped the same way)
//! - failing unsignaled exit with the monitor armed: restart after `restart_delay`
//! - anything else: channel cleared, status=stopped, emit WorkerStopped
//!
//! ## Rules
//! - Overlapping requests are rejected, not queued: start while live → `AlreadyStarted`,
//!   restart while busy → `RestartInProgress`. Concurrent stops share one stop sequence.
//! - `SIGKILL` is sent at most once per stop.
//! - Automatic restart counters never reset.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::SupervisorConfig;
use super::handle::{Reply, Request, RestartCounters, WorkerHandle, WorkerInfo, WorkerStatus};
use super::handshake::{self, Outcome};
use crate::channel::{Exit, ProcessChannel, Signal, SpawnTarget};
use crate::error::SupervisorError;
use crate::events::{Bus, Event, EventKind};
use crate::protocol::{Command, Status, StatusKind};

/// Deadlines applied by a worker actor.
#[derive(Clone, Copy, Debug)]
pub(crate) struct WorkerActorParams {
    pub kill_timeout: Duration,
    pub ready_timeout: Duration,
    pub start_timeout: Duration,
    pub restart_delay: Duration,
}

impl From<&SupervisorConfig> for WorkerActorParams {
    fn from(cfg: &SupervisorConfig) -> Self {
        Self {
            kill_timeout: cfg.kill_timeout,
            ready_timeout: cfg.ready_timeout,
            start_timeout: cfg.start_timeout,
            restart_delay: cfg.restart_delay,
        }
    }
}

/// Why a handshake step did not complete.
enum Abort {
    TimedOut,
    Exited(Exit),
    Stop,
}

enum Idle {
    Exited(Exit),
    Status(Option<Status>),
}

pub(crate) struct WorkerActor {
    id: usize,
    target: SpawnTarget,
    params: WorkerActorParams,
    bus: Bus,
    info: watch::Sender<WorkerInfo>,
    requests: mpsc::UnboundedReceiver<Request>,
    shutting_down: Arc<AtomicBool>,

    channel: Option<ProcessChannel>,
    /// Exit observed while idle and not consumed yet (restart pending or shutdown).
    exited: Option<Exit>,
    monitor: bool,
    restart_timer: Option<Pin<Box<Sleep>>>,
    stop_waiters: Vec<Reply<Option<Exit>>>,
}

impl WorkerActor {
    /// Creates the actor for slot `id`, spawns it and returns its handle.
    pub(crate) fn spawn(
        id: usize,
        target: SpawnTarget,
        cfg: &SupervisorConfig,
        bus: Bus,
        shutting_down: Arc<AtomicBool>,
        token: CancellationToken,
    ) -> WorkerHandle {
        let label: Arc<str> = target.label().into();
        let (info, info_rx) = watch::channel(WorkerInfo {
            id,
            title: Arc::clone(&label),
            target: label,
            status: WorkerStatus::Unknown,
            pid: None,
            restarts: RestartCounters::new(cfg.restarts),
        });
        let (tx, requests) = mpsc::unbounded_channel();

        let actor = WorkerActor {
            id,
            target,
            params: WorkerActorParams::from(cfg),
            bus,
            info,
            requests,
            shutting_down,
            channel: None,
            exited: None,
            monitor: false,
            restart_timer: None,
            stop_waiters: Vec::new(),
        };
        tokio::spawn(actor.run(token));
        WorkerHandle::new(id, info_rx, tx)
    }

    /// Serves requests and watches the idle process until cancelled or every handle is gone.
    pub(crate) async fn run(mut self, token: CancellationToken) {
        loop {
            let watch_exit = self.exited.is_none();
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                request = self.requests.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => break,
                },
                _ = restart_due(&mut self.restart_timer) => self.auto_restart().await,
                idle = idle(&mut self.channel, watch_exit) => match idle {
                    Idle::Exited(exit) => self.on_idle_exit(exit),
                    Idle::Status(Some(status)) => {
                        debug!(worker = self.id, status = status.status.as_str(), "ignoring status from running worker");
                    }
                    Idle::Status(None) => debug!(worker = self.id, "worker closed its channel"),
                },
            }
        }
        debug!(worker = self.id, "actor finished");
    }

    async fn handle(&mut self, request: Request) {
        match request {
            Request::Start(reply) => {
                let res = self.start().await;
                self.answer("start", reply, res);
            }
            Request::Stop(reply) => {
                self.stop_waiters.push(reply);
                if let Err(e) = self.stop().await {
                    debug!(worker = self.id, error = %e, "stop request failed");
                }
            }
            Request::Restart(reply) => {
                let res = self.restart().await;
                self.answer("restart", reply, res);
            }
        }
    }

    async fn start(&mut self) -> Result<(), SupervisorError> {
        if self.channel.is_some() {
            return Err(self.fail(SupervisorError::AlreadyStarted));
        }
        debug!(worker = self.id, target = %self.target.label(), "starting worker");

        let mut channel = match self.target.spawn() {
            Ok(channel) => channel,
            Err(e) => {
                self.update(|i| i.status = WorkerStatus::Errored);
                return Err(self.fail(SupervisorError::Spawn(e.to_string())));
            }
        };
        self.exited = None;
        self.monitor = false;
        let pid = channel.pid();
        self.update(|i| {
            i.status = WorkerStatus::Spawned;
            i.pid = pid;
        });

        let timeout = self.params.ready_timeout;
        let ready = match self.handshake(&mut channel, StatusKind::Ready, timeout).await {
            Ok(status) => status,
            Err(abort) => {
                let err = SupervisorError::ReadyTimeout { timeout };
                return self.abort_start(channel, abort, err).await;
            }
        };
        self.update(|i| {
            if !ready.title.is_empty() {
                i.title = ready.title.as_str().into();
            }
            i.status = WorkerStatus::Ready;
        });
        debug!(worker = self.id, title = %ready.title, "worker signaled its readiness");
        self.emit(EventKind::WorkerReady);

        if let Err(e) = channel.send(Command::START) {
            warn!(worker = self.id, error = %e, "cannot send start command");
        }

        let timeout = self.params.start_timeout;
        if let Err(abort) = self.handshake(&mut channel, StatusKind::Started, timeout).await {
            let err = SupervisorError::StartAckTimeout { timeout };
            return self.abort_start(channel, abort, err).await;
        }

        let restarts = self.info.borrow().restarts;
        self.monitor = restarts.policy.allows(restarts.automatic);
        self.channel = Some(channel);
        self.update(|i| i.status = WorkerStatus::Started);
        info!(worker = self.id, title = %self.title(), monitor = self.monitor, "worker started");
        self.emit(EventKind::WorkerStarted);
        Ok(())
    }

    /// Runs one handshake step, answering requests that arrive meanwhile.
    async fn handshake(
        &mut self,
        channel: &mut ProcessChannel,
        expected: StatusKind,
        timeout: Duration,
    ) -> Result<Status, Abort> {
        let deadline = Instant::now() + timeout;
        loop {
            match handshake::await_status(channel, expected, deadline, &mut self.requests).await {
                Outcome::Received(status) => return Ok(status),
                Outcome::TimedOut => return Err(Abort::TimedOut),
                Outcome::Exited(exit) => return Err(Abort::Exited(exit)),
                Outcome::Interrupted(Request::Stop(reply)) => {
                    self.stop_waiters.push(reply);
                    return Err(Abort::Stop);
                }
                Outcome::Interrupted(Request::Start(reply)) => {
                    let err = self.fail(SupervisorError::AlreadyStarted);
                    self.answer("start", reply, Err(err));
                }
                Outcome::Interrupted(Request::Restart(reply)) => {
                    self.answer("restart", reply, Err(SupervisorError::RestartInProgress));
                }
            }
        }
    }

    async fn abort_start(
        &mut self,
        channel: ProcessChannel,
        abort: Abort,
        timeout_err: SupervisorError,
    ) -> Result<(), SupervisorError> {
        match abort {
            Abort::TimedOut => {
                self.channel = Some(channel);
                Err(self.fail(timeout_err))
            }
            Abort::Exited(exit) if exit.signal.is_none() => {
                drop(channel);
                debug!(worker = self.id, %exit, "worker exited while starting");
                self.update(|i| {
                    i.status = WorkerStatus::Errored;
                    i.pid = None;
                });
                Err(self.fail(SupervisorError::StartFailure { code: exit.code }))
            }
            Abort::Exited(exit) => {
                drop(channel);
                debug!(worker = self.id, %exit, "worker was signalled while starting");
                self.finish_exit(exit);
                Err(SupervisorError::StartInterrupted {
                    signal: exit.signal,
                })
            }
            Abort::Stop => {
                self.channel = Some(channel);
                if let Err(e) = self.stop().await {
                    debug!(worker = self.id, error = %e, "stop during start failed");
                }
                Err(SupervisorError::StartInterrupted { signal: None })
            }
        }
    }

    /// Stops the live process and answers every pending stop waiter with the result.
    async fn stop(&mut self) -> Result<Option<Exit>, SupervisorError> {
        let res = self.stop_inner().await;
        for waiter in std::mem::take(&mut self.stop_waiters) {
            self.answer("stop", waiter, res.clone());
        }
        res
    }

    async fn stop_inner(&mut self) -> Result<Option<Exit>, SupervisorError> {
        let Some(mut channel) = self.channel.take() else {
            if self.shutting_down.load(Ordering::Acquire) {
                return Ok(None);
            }
            return Err(self.fail(SupervisorError::AlreadyStopped));
        };
        debug!(worker = self.id, title = %self.title(), "stopping worker");
        self.restart_timer = None;
        self.monitor = false;
        self.update(|i| i.status = WorkerStatus::Stopping);

        let exit = match self.exited.take().or_else(|| channel.exit_status()) {
            Some(exit) => exit,
            None => self.kill(&mut channel).await,
        };
        drop(channel);
        self.finish_exit(exit);
        Ok(Some(exit))
    }

    /// Graceful request, then `SIGKILL` once `kill_timeout` elapses.
    async fn kill(&mut self, channel: &mut ProcessChannel) -> Exit {
        if channel.is_connected() {
            debug!(worker = self.id, "asking for graceful stop");
            if channel.send(Command::STOP).is_err() {
                self.signal(channel, Signal::Terminate);
            }
        } else {
            debug!(worker = self.id, "worker was not connected, terminating");
            self.signal(channel, Signal::Terminate);
        }

        let deadline = time::sleep(self.params.kill_timeout);
        tokio::pin!(deadline);
        let mut escalated = false;
        let mut requests_open = true;

        loop {
            let inbound_open = channel.inbound.is_open();
            tokio::select! {
                biased;
                exit = channel.exit.wait() => return exit,
                _ = &mut deadline, if !escalated => {
                    escalated = true;
                    warn!(worker = self.id, timeout = ?self.params.kill_timeout, "worker did not exit in time, killing");
                    self.signal(channel, Signal::Kill);
                }
                request = self.requests.recv(), if requests_open => match request {
                    Some(Request::Stop(reply)) => self.stop_waiters.push(reply),
                    Some(Request::Start(reply)) => {
                        let err = self.fail(SupervisorError::AlreadyStarted);
                        self.answer("start", reply, Err(err));
                    }
                    Some(Request::Restart(reply)) => {
                        self.answer("restart", reply, Err(SupervisorError::RestartInProgress));
                    }
                    None => requests_open = false,
                },
                status = channel.inbound.recv(), if inbound_open => {
                    if let Some(status) = status {
                        debug!(worker = self.id, status = status.status.as_str(), "worker reported while stopping");
                    }
                }
            }
        }
    }

    async fn restart(&mut self) -> Result<(), SupervisorError> {
        info!(worker = self.id, title = %self.title(), "restarting worker");
        if let Err(e) = self.stop().await {
            debug!(worker = self.id, error = %e, "restart: stop failed, starting anyway");
        }
        self.update(|i| {
            i.restarts.manual = i.restarts.manual.saturating_add(1);
            i.status = WorkerStatus::Restarting;
        });
        self.bus
            .publish(self.event(EventKind::WorkerRestarted).with_reason("manual"));
        self.start().await
    }

    fn on_idle_exit(&mut self, exit: Exit) {
        debug!(worker = self.id, %exit, "worker exit detected");
        if self.shutting_down.load(Ordering::Acquire) {
            self.exited = Some(exit);
            return;
        }
        if self.monitor && exit.is_failure() {
            info!(worker = self.id, %exit, delay = ?self.params.restart_delay, "attempting to restart worker");
            self.exited = Some(exit);
            self.restart_timer = Some(Box::pin(time::sleep(self.params.restart_delay)));
            return;
        }
        self.finish_exit(exit);
    }

    async fn auto_restart(&mut self) {
        self.restart_timer = None;
        if self.shutting_down.load(Ordering::Acquire) {
            // The pending exit stays recorded for the coming stop.
            debug!(worker = self.id, "shutting down, automatic restart dropped");
            return;
        }
        self.exited = None;
        self.channel = None;
        self.monitor = false;
        self.update(|i| {
            i.restarts.automatic = i.restarts.automatic.saturating_add(1);
            i.status = WorkerStatus::Restarting;
            i.pid = None;
        });
        self.bus
            .publish(self.event(EventKind::WorkerRestarted).with_reason("automatic"));
        if let Err(e) = self.start().await {
            debug!(worker = self.id, error = %e, "automatic restart failed");
        }
    }

    /// Clears the slot after its process exited and reports how.
    fn finish_exit(&mut self, exit: Exit) {
        self.channel = None;
        self.exited = None;
        self.monitor = false;
        self.restart_timer = None;
        let forced = exit.is_forced();
        self.update(|i| {
            i.status = if forced {
                WorkerStatus::Killed
            } else {
                WorkerStatus::Stopped
            };
            i.pid = None;
        });
        let kind = if forced {
            EventKind::WorkerKilled
        } else {
            EventKind::WorkerStopped
        };
        info!(worker = self.id, title = %self.title(), %exit, "worker {}", kind.as_str());
        self.bus.publish(self.event(kind).with_exit(exit));
    }

    fn signal(&self, channel: &ProcessChannel, signal: Signal) {
        if let Err(e) = channel.kill(signal) {
            warn!(worker = self.id, error = %e, label = e.as_label(), "cannot signal worker");
        }
    }

    /// Delivers a request's result; the requester may have stopped waiting.
    fn answer<T>(&self, op: &'static str, reply: Reply<T>, res: Result<T, SupervisorError>) {
        if reply.send(res).is_err() {
            debug!(worker = self.id, op, "requester went away before the reply");
        }
    }

    /// Reports a failed operation and hands the error back.
    fn fail(&self, err: SupervisorError) -> SupervisorError {
        warn!(worker = self.id, title = %self.title(), error = %err, label = err.as_label(), "worker error");
        self.bus
            .publish(self.event(EventKind::WorkerError).with_error(&err));
        err
    }

    fn emit(&self, kind: EventKind) {
        self.bus.publish(self.event(kind));
    }

    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind).with_worker(self.info.borrow().clone())
    }

    fn title(&self) -> Arc<str> {
        Arc::clone(&self.info.borrow().title)
    }

    fn update(&self, f: impl FnOnce(&mut WorkerInfo)) {
        self.info.send_modify(f);
    }
}

async fn restart_due(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Traffic from a live process while no request is in flight.
async fn idle(channel: &mut Option<ProcessChannel>, watch_exit: bool) -> Idle {
    let Some(channel) = channel else {
        return std::future::pending().await;
    };
    let inbound_open = channel.inbound.is_open();
    let inbound = &mut channel.inbound;
    let exit = &mut channel.exit;
    tokio::select! {
        status = inbound.recv(), if inbound_open => Idle::Status(status),
        exited = exit.wait(), if watch_exit => Idle::Exited(exited),
        else => std::future::pending().await,
    }
}
