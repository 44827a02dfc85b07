//! Process channels: the link between a supervisor and one worker process.
//!
//! ## Contents
//! - [`ProcessChannel`] master-side end: send commands, receive statuses, observe exit, signal
//! - [`ChannelPeer`] process-side end, split into [`ParentLink`] (protocol) and [`PeerProcess`] (lifecycle)
//! - [`Exit`], [`Signal`] exit notification payload
//! - [`SpawnTarget`], [`CommandSpec`], [`Fork`] spawn strategies
//!
//! ## Architecture
//! ```text
//!  Supervisor actor                         worker process
//!  ┌──────────────┐  Command (start/stop)   ┌────────────┐
//!  │ProcessChannel│ ──────────────────────► │ ParentLink │──► Worker engine
//!  │              │ ◄────────────────────── │            │
//!  │              │  Status (ready/...)     └────────────┘
//!  │              │  Signal (TERM/KILL)     ┌────────────┐
//!  │              │ ──────────────────────► │PeerProcess │──► OS process / pool member
//!  │              │ ◄────────────────────── │            │
//!  └──────────────┘  Exit {code, signal}    └────────────┘
//! ```
//!
//! Both ends are joined by in-memory tokio channels; the subprocess strategy
//! bridges the process side onto the child's stdio (see `spawn`).

mod pair;
mod spawn;
mod stdio;

pub use pair::{ChannelPeer, ParentLink, PeerProcess, ProcessChannel};
pub use spawn::{CommandSpec, Fork, SpawnTarget, CHANNEL_ENV};

pub(crate) use stdio::stdio_link;

use std::fmt;

/// OS-level termination signal, as carried by an [`Exit`] or a kill request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signal {
    /// `SIGINT`
    Interrupt,
    /// `SIGTERM` (cooperative termination)
    Terminate,
    /// `SIGKILL` (forceful, cannot be caught)
    Kill,
    /// Any other signal number.
    Other(i32),
}

impl Signal {
    /// Maps a raw signal number to a [`Signal`].
    #[cfg(unix)]
    pub fn from_raw(signo: i32) -> Self {
        use nix::sys::signal::Signal as Nix;

        match Nix::try_from(signo) {
            Ok(Nix::SIGINT) => Signal::Interrupt,
            Ok(Nix::SIGTERM) => Signal::Terminate,
            Ok(Nix::SIGKILL) => Signal::Kill,
            _ => Signal::Other(signo),
        }
    }

    #[cfg(not(unix))]
    pub fn from_raw(signo: i32) -> Self {
        match signo {
            2 => Signal::Interrupt,
            15 => Signal::Terminate,
            9 => Signal::Kill,
            n => Signal::Other(n),
        }
    }

    /// Returns `true` for the uncatchable forceful-termination signal.
    pub fn is_forced(&self) -> bool {
        matches!(self, Signal::Kill)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Interrupt => f.write_str("SIGINT"),
            Signal::Terminate => f.write_str("SIGTERM"),
            Signal::Kill => f.write_str("SIGKILL"),
            Signal::Other(n) => write!(f, "SIG{n}"),
        }
    }
}

/// Exit notification: exit code and/or terminating signal.
///
/// Both fields may be absent when the exit could not be observed (e.g. the
/// process host vanished without reporting).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Exit {
    pub code: Option<i32>,
    pub signal: Option<Signal>,
}

impl Exit {
    /// Process exited on its own with `code`.
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// Process was terminated by `signal`.
    pub fn signaled(signal: Signal) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// Exit code 0 and no signal: a deliberate exit that never triggers a restart.
    pub fn is_clean(&self) -> bool {
        self.code == Some(0) && self.signal.is_none()
    }

    /// Non-zero (or unknown) code without a signal: eligible for automatic restart.
    pub fn is_failure(&self) -> bool {
        self.signal.is_none() && self.code != Some(0)
    }

    /// Terminated by the forceful-termination signal.
    pub fn is_forced(&self) -> bool {
        self.signal.is_some_and(|s| s.is_forced())
    }

    pub(crate) fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            Self {
                code: status.code(),
                signal: status.signal().map(Signal::from_raw),
            }
        }
        #[cfg(not(unix))]
        {
            Self {
                code: status.code(),
                signal: None,
            }
        }
    }
}

impl fmt::Display for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (_, Some(sig)) => write!(f, "signal={sig}"),
            (Some(code), None) => write!(f, "code={code}"),
            (None, None) => f.write_str("unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_classification() {
        assert!(Exit::code(0).is_clean());
        assert!(!Exit::code(0).is_failure());
        assert!(Exit::code(3).is_failure());
        assert!(!Exit::signaled(Signal::Terminate).is_failure());
        assert!(Exit::signaled(Signal::Kill).is_forced());
        assert!(!Exit::signaled(Signal::Terminate).is_forced());
    }

    #[test]
    fn signal_names() {
        assert_eq!(Signal::Kill.to_string(), "SIGKILL");
        assert_eq!(Signal::Terminate.to_string(), "SIGTERM");
        assert_eq!(Signal::from_raw(9), Signal::Kill);
        assert_eq!(Signal::from_raw(15), Signal::Terminate);
    }

    #[test]
    fn exit_display() {
        assert_eq!(Exit::code(1).to_string(), "code=1");
        assert_eq!(Exit::signaled(Signal::Kill).to_string(), "signal=SIGKILL");
    }
}
