//! # Events emitted by the supervisor and its worker actors.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Worker events**: one slot's handshake and teardown (ready, started, stopped, killed, restarted, error)
//! - **Supervisor events**: the overall start/stop sequence
//! - **Subscriber events**: fan-out problems (overflow, panic)
//!
//! The [`Event`] struct carries a snapshot of the worker, the exit status for
//! stop/kill, and a reason for errors.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! At most one event is emitted per worker transition.
//!
//! ## Example
//! ```rust
//! use procvisor::{Event, EventKind, Exit};
//!
//! let ev = Event::new(EventKind::WorkerStopped)
//!     .with_exit(Exit::code(0))
//!     .with_reason("deliberate");
//!
//! assert_eq!(ev.kind, EventKind::WorkerStopped);
//! assert_eq!(ev.exit, Some(Exit::code(0)));
//! assert_eq!(ev.kind.as_str(), "stopped");
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::channel::Exit;
use crate::core::WorkerInfo;
use crate::error::SupervisorError;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of supervisor events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Worker events ===
    /// Worker reported `ready`; its title is now known.
    ///
    /// Sets: `worker`
    WorkerReady,

    /// Worker reported `started`.
    ///
    /// Sets: `worker`
    WorkerStarted,

    /// Worker exited after a graceful stop, or on its own without being restarted.
    ///
    /// Sets: `worker`, `exit`
    WorkerStopped,

    /// Worker exited because of the forceful-termination signal.
    ///
    /// Sets: `worker`, `exit`
    WorkerKilled,

    /// Worker was restarted (manually or automatically).
    ///
    /// Sets: `worker`, `reason` (`"manual"` or `"automatic"`)
    WorkerRestarted,

    /// A per-worker operation failed.
    ///
    /// Sets: `worker`, `reason` (error message), `error` (label)
    WorkerError,

    // === Supervisor events ===
    /// The overall start sequence finished (individual workers may have failed).
    SupervisorStarted,

    /// Every worker's stop sequence completed.
    SupervisorStopped,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `reason` (`subscriber=<name> info=<panic message>`)
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `reason` (`subscriber=<name> reason=<full|closed>`)
    SubscriberOverflow,
}

impl EventKind {
    /// Short lowercase name, as used in echo lines (`worker <name>`).
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::WorkerReady => "ready",
            EventKind::WorkerStarted => "started",
            EventKind::WorkerStopped => "stopped",
            EventKind::WorkerKilled => "killed",
            EventKind::WorkerRestarted => "restarted",
            EventKind::WorkerError => "error",
            EventKind::SupervisorStarted => "supervisor-started",
            EventKind::SupervisorStopped => "supervisor-stopped",
            EventKind::SubscriberPanicked => "subscriber-panicked",
            EventKind::SubscriberOverflow => "subscriber-overflow",
        }
    }

    /// Whether the event concerns one worker slot.
    #[inline]
    pub fn is_worker_event(&self) -> bool {
        matches!(
            self,
            EventKind::WorkerReady
                | EventKind::WorkerStarted
                | EventKind::WorkerStopped
                | EventKind::WorkerKilled
                | EventKind::WorkerRestarted
                | EventKind::WorkerError
        )
    }
}

/// Supervisor event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Snapshot of the worker slot at emission time.
    pub worker: Option<WorkerInfo>,
    /// Exit status (stop/kill).
    pub exit: Option<Exit>,
    /// Human-readable reason (errors, restart cause, overflow details).
    pub reason: Option<Arc<str>>,
    /// Stable error label for [`EventKind::WorkerError`].
    pub error: Option<&'static str>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            worker: None,
            exit: None,
            reason: None,
            error: None,
        }
    }

    #[inline]
    pub fn with_worker(mut self, worker: WorkerInfo) -> Self {
        self.worker = Some(worker);
        self
    }

    #[inline]
    pub fn with_exit(mut self, exit: Exit) -> Self {
        self.exit = Some(exit);
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a failed operation's message and label.
    #[inline]
    pub fn with_error(mut self, err: &SupervisorError) -> Self {
        self.reason = Some(err.to_string().into());
        self.error = Some(err.as_label());
        self
    }

    /// Id of the worker this event concerns.
    #[inline]
    pub fn worker_id(&self) -> Option<usize> {
        self.worker.as_ref().map(|w| w.id)
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} info={info}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::new(EventKind::SupervisorStarted);
        let b = Event::new(EventKind::SupervisorStopped);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn error_carries_label_and_message() {
        let ev = Event::new(EventKind::WorkerError).with_error(&SupervisorError::AlreadyStopped);
        assert_eq!(ev.error, Some("worker_already_stopped"));
        assert_eq!(ev.reason.as_deref(), Some("cannot stop a stopped worker"));
    }

    #[test]
    fn worker_kinds() {
        assert!(EventKind::WorkerKilled.is_worker_event());
        assert!(!EventKind::SupervisorStopped.is_worker_event());
        assert!(!EventKind::SubscriberOverflow.is_worker_event());
    }
}
