//! # In-memory channel pair.
//!
//! [`ProcessChannel::pair`] returns the master end and the process end of one
//! channel. Every spawn strategy is built on top of it: the subprocess
//! strategy bridges the process end onto stdio, pool members hand it to
//! whatever hosts the worker.
//!
//! ## Rules
//! - `connected` flips to `false` when the process end closes its [`ParentLink`]
//!   or reports an exit; it never flips back.
//! - The exit is reported at most once; later reports are ignored.
//! - Signals sent after an exit was observed are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use super::{Exit, Signal};
use crate::error::ChannelError;
use crate::protocol::{Command, Status};

/// Master-side end of a process channel.
#[derive(Debug)]
pub struct ProcessChannel {
    pid: Option<u32>,
    outbound: mpsc::UnboundedSender<Command>,
    pub(crate) inbound: Inbound,
    pub(crate) exit: ExitWatch,
    signals: mpsc::UnboundedSender<Signal>,
    connected: Arc<AtomicBool>,
}

/// Status stream received from the process.
#[derive(Debug)]
pub(crate) struct Inbound {
    rx: mpsc::UnboundedReceiver<Status>,
    open: bool,
}

impl Inbound {
    pub(crate) fn is_open(&self) -> bool {
        self.open
    }

    /// Next status; `None` once the process end stopped sending.
    pub(crate) async fn recv(&mut self) -> Option<Status> {
        let next = self.rx.recv().await;
        if next.is_none() {
            self.open = false;
        }
        next
    }
}

/// Exit notification of the process.
#[derive(Debug)]
pub(crate) struct ExitWatch {
    rx: watch::Receiver<Option<Exit>>,
}

impl ExitWatch {
    pub(crate) fn get(&self) -> Option<Exit> {
        *self.rx.borrow()
    }

    /// Resolves once the process exited. Cancel safe.
    ///
    /// If the process end vanished without reporting, resolves with an
    /// unknown [`Exit`] rather than hanging.
    pub(crate) async fn wait(&mut self) -> Exit {
        loop {
            if let Some(exit) = *self.rx.borrow_and_update() {
                return exit;
            }
            if self.rx.changed().await.is_err() {
                return self.get().unwrap_or_default();
            }
        }
    }
}

impl ProcessChannel {
    /// Creates a connected channel pair.
    pub fn pair(pid: Option<u32>) -> (ProcessChannel, ChannelPeer) {
        let (channel, raw) = Self::raw(pid);
        let peer = ChannelPeer {
            link: ParentLink::new(raw.commands, raw.statuses, raw.connected),
            process: raw.process,
        };
        (channel, peer)
    }

    /// Like [`pair`](Self::pair) but hands out the process end unassembled,
    /// for transports that pump each direction from its own task.
    pub(crate) fn raw(pid: Option<u32>) -> (ProcessChannel, RawPeer) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let (sig_tx, sig_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        let connected = Arc::new(AtomicBool::new(true));

        let channel = ProcessChannel {
            pid,
            outbound: cmd_tx,
            inbound: Inbound {
                rx: status_rx,
                open: true,
            },
            exit: ExitWatch { rx: exit_rx },
            signals: sig_tx,
            connected: Arc::clone(&connected),
        };
        let raw = RawPeer {
            commands: cmd_rx,
            statuses: status_tx,
            connected: Arc::clone(&connected),
            process: PeerProcess {
                signals: sig_rx,
                exit: exit_tx,
                connected,
            },
        };
        (channel, raw)
    }

    /// OS process id, when the channel fronts a real process.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether commands can still reach the process.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
            && self.inbound.is_open()
            && self.exit.get().is_none()
    }

    /// Sends a command to the process.
    pub fn send(&self, command: Command) -> Result<(), ChannelError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(ChannelError::Disconnected);
        }
        self.outbound
            .send(command)
            .map_err(|_| ChannelError::Disconnected)
    }

    /// Next status message; `None` once the process stopped talking.
    pub async fn recv(&mut self) -> Option<Status> {
        self.inbound.recv().await
    }

    /// Waits for the process to exit.
    pub async fn exited(&mut self) -> Exit {
        self.exit.wait().await
    }

    /// Exit observed so far, if any.
    pub fn exit_status(&self) -> Option<Exit> {
        self.exit.get()
    }

    /// Requests delivery of `signal` to the process.
    ///
    /// No-op once the process has exited.
    pub fn kill(&self, signal: Signal) -> Result<(), ChannelError> {
        if self.exit.get().is_some() {
            return Ok(());
        }
        self.signals
            .send(signal)
            .map_err(|_| ChannelError::Signal {
                signal,
                reason: "process host is gone".into(),
            })
    }
}

/// Unassembled process end, see [`ProcessChannel::raw`].
pub(crate) struct RawPeer {
    pub(crate) commands: mpsc::UnboundedReceiver<Command>,
    pub(crate) statuses: mpsc::UnboundedSender<Status>,
    pub(crate) connected: Arc<AtomicBool>,
    pub(crate) process: PeerProcess,
}

/// Process-side end of a channel.
#[derive(Debug)]
pub struct ChannelPeer {
    /// Protocol side, consumed by the worker engine.
    pub link: ParentLink,
    /// Lifecycle side, consumed by whatever hosts the process.
    pub process: PeerProcess,
}

impl ChannelPeer {
    pub fn split(self) -> (ParentLink, PeerProcess) {
        (self.link, self.process)
    }

    pub async fn recv_command(&mut self) -> Option<Command> {
        self.link.recv().await
    }

    pub fn send_status(&self, status: Status) -> Result<(), ChannelError> {
        self.link.send(status)
    }

    pub async fn next_signal(&mut self) -> Option<Signal> {
        self.process.next_signal().await
    }

    pub fn try_signal(&mut self) -> Option<Signal> {
        self.process.try_signal()
    }

    pub fn report_exit(&self, exit: Exit) {
        self.process.report_exit(exit);
    }
}

/// Worker engine's view of its parent.
#[derive(Debug)]
pub struct ParentLink {
    pub(crate) commands: mpsc::UnboundedReceiver<Command>,
    pub(crate) statuses: Option<mpsc::UnboundedSender<Status>>,
    pub(crate) connected: Arc<AtomicBool>,
    pub(crate) flushed: Option<oneshot::Receiver<()>>,
}

impl ParentLink {
    pub(crate) fn new(
        commands: mpsc::UnboundedReceiver<Command>,
        statuses: mpsc::UnboundedSender<Status>,
        connected: Arc<AtomicBool>,
    ) -> Self {
        Self {
            commands,
            statuses: Some(statuses),
            connected,
            flushed: None,
        }
    }

    pub(crate) fn with_flush(mut self, flushed: oneshot::Receiver<()>) -> Self {
        self.flushed = Some(flushed);
        self
    }

    /// Next command from the parent; `None` when the parent is unreachable.
    pub async fn recv(&mut self) -> Option<Command> {
        self.commands.recv().await
    }

    pub fn send(&self, status: Status) -> Result<(), ChannelError> {
        match &self.statuses {
            Some(tx) => tx.send(status).map_err(|_| ChannelError::Disconnected),
            None => Err(ChannelError::Disconnected),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.statuses.is_some() && self.connected.load(Ordering::Acquire)
    }

    /// Graceful disconnect: stops sending and waits until queued statuses were written out.
    pub async fn close(mut self) {
        self.connected.store(false, Ordering::Release);
        self.statuses = None;
        if let Some(flushed) = self.flushed.take() {
            let _ = flushed.await;
        }
    }
}

impl Drop for ParentLink {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::Release);
    }
}

/// Lifecycle side of the process end: receives kill requests, reports the exit.
#[derive(Debug)]
pub struct PeerProcess {
    signals: mpsc::UnboundedReceiver<Signal>,
    exit: watch::Sender<Option<Exit>>,
    connected: Arc<AtomicBool>,
}

impl PeerProcess {
    /// Next signal requested by the master; `None` once the master dropped its end.
    pub async fn next_signal(&mut self) -> Option<Signal> {
        self.signals.recv().await
    }

    pub fn try_signal(&mut self) -> Option<Signal> {
        self.signals.try_recv().ok()
    }

    /// Reports the process exit. Only the first report counts.
    pub fn report_exit(&self, exit: Exit) {
        self.connected.store(false, Ordering::Release);
        self.exit.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(exit);
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::StatusKind;

    #[tokio::test]
    async fn commands_and_statuses_flow() {
        let (mut ch, mut peer) = ProcessChannel::pair(Some(42));
        assert_eq!(ch.pid(), Some(42));
        assert!(ch.is_connected());

        ch.send(Command::START).unwrap();
        assert_eq!(peer.recv_command().await, Some(Command::START));

        peer.send_status(Status::new(StatusKind::Ready, "w")).unwrap();
        let got = ch.recv().await.unwrap();
        assert_eq!(got.status, StatusKind::Ready);
        assert_eq!(got.title, "w");
    }

    #[tokio::test]
    async fn exit_is_reported_once() {
        let (mut ch, peer) = ProcessChannel::pair(None);
        peer.report_exit(Exit::code(3));
        peer.report_exit(Exit::code(0));

        assert_eq!(ch.exited().await, Exit::code(3));
        assert_eq!(ch.exit_status(), Some(Exit::code(3)));
        assert!(!ch.is_connected());
    }

    #[tokio::test]
    async fn kill_after_exit_is_dropped() {
        let (ch, mut peer) = ProcessChannel::pair(None);
        ch.kill(Signal::Terminate).unwrap();
        assert_eq!(peer.next_signal().await, Some(Signal::Terminate));

        peer.report_exit(Exit::signaled(Signal::Terminate));
        ch.kill(Signal::Kill).unwrap();
        assert_eq!(peer.try_signal(), None);
    }

    #[tokio::test]
    async fn dropped_peer_resolves_exit_as_unknown() {
        let (mut ch, peer) = ProcessChannel::pair(None);
        drop(peer);
        assert_eq!(ch.exited().await, Exit::default());
        assert!(!ch.is_connected());
        assert!(ch.send(Command::STOP).is_err());
    }

    #[tokio::test]
    async fn closing_the_link_disconnects() {
        let (mut ch, peer) = ProcessChannel::pair(None);
        let (link, _process) = peer.split();
        link.close().await;
        assert!(!ch.is_connected());
        assert_eq!(ch.recv().await, None);
    }
}
