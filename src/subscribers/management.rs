//! # ManagementInterface: console-facing view of a running supervisor.
//!
//! Holds the worker list and echoes worker events to attached consoles.
//! It is a plain [`Subscribe`] implementation; the transport (terminal,
//! socket, admin endpoint) is left to the application.
//!
//! ## Echo format
//! ```text
//! 0/job: worker ready
//! 0/job: worker stopped /code=0
//! 1/[bin/flaky]: worker error /worker exited before completing its start handshake (code=Some(1))
//! ```
//!
//! ## Commands
//! ```text
//! workers  → workers() / worker(id) (start, stop, restart them)
//! echo()   → toggle_echo() (on by default)
//! help()   → help()
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::{ManagementConfig, WorkerHandle, WorkerInfo};
use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

const HELP: &[&str] = &[
    "Use these commands to control your workers:",
    "---------",
    "workers - show current workers, start, stop, restart them",
    "echo()  - activate/deactivate event echoing (on by default)",
    "help()  - show help",
];

/// Worker list, echo toggle and console fan-out.
pub struct ManagementInterface {
    workers: Vec<WorkerHandle>,
    echo: AtomicBool,
    consoles: Mutex<Vec<mpsc::UnboundedSender<String>>>,
}

impl ManagementInterface {
    pub fn new(workers: Vec<WorkerHandle>, cfg: &ManagementConfig) -> Self {
        Self {
            workers,
            echo: AtomicBool::new(cfg.echo),
            consoles: Mutex::new(Vec::new()),
        }
    }

    /// Snapshots of every worker slot, in start order.
    pub fn workers(&self) -> Vec<WorkerInfo> {
        self.workers.iter().map(WorkerHandle::info).collect()
    }

    /// Handle to one worker, for start/stop/restart.
    pub fn worker(&self, id: usize) -> Option<&WorkerHandle> {
        self.workers.get(id)
    }

    /// Flips event echoing; returns the new state.
    pub fn toggle_echo(&self) -> bool {
        !self.echo.fetch_xor(true, Ordering::AcqRel)
    }

    pub fn echo_enabled(&self) -> bool {
        self.echo.load(Ordering::Acquire)
    }

    pub fn help(&self) -> &'static [&'static str] {
        HELP
    }

    /// Attaches a console; it receives one line per echoed event until dropped.
    pub fn attach(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.consoles().push(tx);
        rx
    }

    /// Renders the echo line for a worker event, `None` for anything else.
    pub fn echo_line(ev: &Event) -> Option<String> {
        if !ev.kind.is_worker_event() {
            return None;
        }
        let worker = ev.worker.as_ref()?;
        let info = match ev.kind {
            EventKind::WorkerStopped | EventKind::WorkerKilled => ev.exit.map(|x| x.to_string()),
            EventKind::WorkerError => ev.reason.as_deref().map(str::to_string),
            _ => None,
        };
        let mut line = format!("{}/{}: worker {}", worker.id, worker.title, ev.kind.as_str());
        if let Some(info) = info {
            line.push_str(" /");
            line.push_str(&info);
        }
        Some(line)
    }

    fn consoles(&self) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<String>>> {
        self.consoles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Subscribe for ManagementInterface {
    async fn on_event(&self, ev: &Event) {
        if !self.echo_enabled() {
            return;
        }
        let Some(line) = Self::echo_line(ev) else {
            return;
        };
        self.consoles()
            .retain(|console| console.send(line.clone()).is_ok());
    }

    fn name(&self) -> &'static str {
        "management"
    }
}
