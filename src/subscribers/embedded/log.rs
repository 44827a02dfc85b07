//! # LogWriter: event printer
//!
//! A minimal subscriber that renders every [`Event`] through `tracing`.
//! Use it for demos or when no other observer is wired in.
//!
//! ## Example output
//! ```text
//! [ready] worker=0 title="job" status=ready
//! [started] worker=0 title="job"
//! [error] worker=1 title="[bin/worker]" err="worker could not be ready within 10s"
//! [killed] worker=0 title="job" exit=SIGKILL
//! [restarted] worker=1 title="job" cause=automatic restarts=1
//! ```

use async_trait::async_trait;
use tracing::{info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let (id, title) = match &e.worker {
            Some(w) => (Some(w.id), w.title.as_ref()),
            None => (None, ""),
        };
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::WorkerReady | EventKind::WorkerStarted => {
                info!(worker = ?id, %title, "[{}]", e.kind.as_str());
            }
            EventKind::WorkerStopped | EventKind::WorkerKilled => {
                let exit = e.exit.map(|x| x.to_string()).unwrap_or_default();
                info!(worker = ?id, %title, %exit, "[{}]", e.kind.as_str());
            }
            EventKind::WorkerRestarted => {
                let restarts = e.worker.as_ref().map(|w| w.restarts.total());
                info!(worker = ?id, %title, cause = %reason, ?restarts, "[restarted]");
            }
            EventKind::WorkerError => {
                warn!(worker = ?id, %title, err = %reason, label = ?e.error, "[error]");
            }
            EventKind::SupervisorStarted => info!("[supervisor-started]"),
            EventKind::SupervisorStopped => info!("[supervisor-stopped]"),
            EventKind::SubscriberOverflow => warn!(%reason, "[subscriber-overflow]"),
            EventKind::SubscriberPanicked => warn!(%reason, "[subscriber-panicked]"),
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
