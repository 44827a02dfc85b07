//! Error types used by the supervisor, the worker engine and the process channel.
//!
//! - [`SupervisorError`] failures of per-worker operations and of the supervisor itself.
//! - [`WorkerError`] failures of the worker-side protocol engine.
//! - [`ChannelError`] transport failures (spawn, send, signal delivery).
//! - [`ProtocolError`] undecodable control envelopes.
//! - [`HookError`] opaque failure returned by user start/stop hooks.
//!
//! Every enum provides `as_label()` (stable snake_case) for logs/metrics.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::channel::Signal;

/// # Errors produced by supervisor operations.
///
/// Per-worker errors are returned from the operation **and** published as
/// [`EventKind::WorkerError`](crate::EventKind::WorkerError).
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum SupervisorError {
    /// Start requested while the slot already owns a live channel.
    #[error("cannot start a started worker")]
    AlreadyStarted,

    /// Stop requested while the slot has no channel (suppressed during global shutdown).
    #[error("cannot stop a stopped worker")]
    AlreadyStopped,

    /// The worker did not report `ready` in time.
    #[error("worker could not be ready within {timeout:?}")]
    ReadyTimeout { timeout: Duration },

    /// The worker did not report `started` in time.
    #[error("worker could not be started within {timeout:?}")]
    StartAckTimeout { timeout: Duration },

    /// The process exited before completing the ready/started handshake.
    #[error("worker exited before completing its start handshake (code={code:?})")]
    StartFailure { code: Option<i32> },

    /// The handshake was abandoned because the process was signalled or a stop was requested.
    #[error("start interrupted (signal={signal:?})")]
    StartInterrupted { signal: Option<Signal> },

    /// A restart was requested while the worker was still starting or stopping.
    #[error("restart requested while the worker is starting or stopping")]
    RestartInProgress,

    /// The spawn strategy failed to produce a channel.
    #[error("spawn failed: {0}")]
    Spawn(String),

    /// A supervisor start/stop hook reported failure.
    #[error("hook failed: {0}")]
    Hook(#[from] HookError),

    /// The worker actor has exited (supervisor dropped).
    #[error("worker actor closed")]
    Closed,
}

impl SupervisorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use procvisor::SupervisorError;
    ///
    /// assert_eq!(SupervisorError::AlreadyStopped.as_label(), "worker_already_stopped");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::AlreadyStarted => "worker_already_started",
            SupervisorError::AlreadyStopped => "worker_already_stopped",
            SupervisorError::ReadyTimeout { .. } => "worker_ready_timeout",
            SupervisorError::StartAckTimeout { .. } => "worker_start_ack_timeout",
            SupervisorError::StartFailure { .. } => "worker_start_failure",
            SupervisorError::StartInterrupted { .. } => "worker_start_interrupted",
            SupervisorError::RestartInProgress => "worker_restart_in_progress",
            SupervisorError::Spawn(_) => "worker_spawn_failed",
            SupervisorError::Hook(_) => "supervisor_hook_failed",
            SupervisorError::Closed => "worker_closed",
        }
    }

    /// Indicates whether the error is a start-handshake failure that must not
    /// abort the serial start sequence.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use procvisor::SupervisorError;
    ///
    /// let timeout = Duration::from_secs(10);
    /// assert!(SupervisorError::ReadyTimeout { timeout }.is_start_failure());
    /// assert!(SupervisorError::StartFailure { code: Some(1) }.is_start_failure());
    /// assert!(!SupervisorError::Closed.is_start_failure());
    /// assert!(!SupervisorError::AlreadyStarted.is_start_failure());
    /// ```
    pub fn is_start_failure(&self) -> bool {
        matches!(
            self,
            SupervisorError::ReadyTimeout { .. }
                | SupervisorError::StartAckTimeout { .. }
                | SupervisorError::StartFailure { .. }
                | SupervisorError::StartInterrupted { .. }
                | SupervisorError::Spawn(_)
        )
    }
}

/// # Errors produced by the worker-side protocol engine.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The parent went away while the engine was still listening.
    #[error("master process died")]
    ParentLost,

    /// A start or stop hook failed.
    #[error("hook failed: {0}")]
    Hook(#[from] HookError),

    /// OS signal listeners could not be installed.
    #[error("signal registration failed: {0}")]
    Signals(#[source] io::Error),
}

impl WorkerError {
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::ParentLost => "worker_parent_lost",
            WorkerError::Hook(_) => "worker_hook_failed",
            WorkerError::Signals(_) => "worker_signals_failed",
        }
    }
}

/// # Errors produced by a process channel.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("failed to spawn process: {0}")]
    Spawn(#[from] io::Error),

    #[error("channel disconnected")]
    Disconnected,

    #[error("failed to deliver {signal}: {reason}")]
    Signal { signal: Signal, reason: String },
}

impl ChannelError {
    pub fn as_label(&self) -> &'static str {
        match self {
            ChannelError::Spawn(_) => "channel_spawn_failed",
            ChannelError::Disconnected => "channel_disconnected",
            ChannelError::Signal { .. } => "channel_signal_failed",
        }
    }
}

/// # Errors produced while decoding control envelopes.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A command carried an action other than `start`/`stop`.
    #[error("unknown protocol action {0:?}")]
    UnknownAction(String),

    /// The `control` payload did not match any known shape.
    #[error("malformed control payload: {0}")]
    Malformed(#[source] serde_json::Error),
}

impl ProtocolError {
    pub fn as_label(&self) -> &'static str {
        match self {
            ProtocolError::UnknownAction(_) => "protocol_unknown_action",
            ProtocolError::Malformed(_) => "protocol_malformed",
        }
    }
}

/// Failure reported by a user-supplied start/stop hook.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HookError {
    message: String,
}

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<SupervisorError> for HookError {
    fn from(e: SupervisorError) -> Self {
        HookError::new(e.to_string())
    }
}
