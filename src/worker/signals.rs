//! # Cross-platform cooperative-termination signals.
//!
//! **Unix:** `SIGINT` and `SIGTERM`.
//! **Windows:** `Ctrl-C` via [`tokio::signal::ctrl_c`].
//!
//! Unlike a one-shot wait, [`ShutdownSignals`] keeps its listeners installed
//! until dropped; dropping it is how the engine unregisters them.

use crate::channel::Signal;

pub(crate) struct ShutdownSignals {
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    /// Installs the listeners. Fails if signal registration fails.
    #[cfg(unix)]
    pub(crate) fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub(crate) fn install() -> std::io::Result<Self> {
        Ok(Self {})
    }

    /// Waits for the next termination signal.
    #[cfg(unix)]
    pub(crate) async fn recv(&mut self) -> Signal {
        tokio::select! {
            _ = self.sigint.recv() => Signal::Interrupt,
            _ = self.sigterm.recv() => Signal::Terminate,
        }
    }

    #[cfg(not(unix))]
    pub(crate) async fn recv(&mut self) -> Signal {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Signal::Interrupt,
            Err(_) => std::future::pending().await,
        }
    }
}
