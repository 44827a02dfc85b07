//! # Spawn strategies.
//!
//! A [`SpawnTarget`] is resolved once when a worker slot is registered and
//! then spawned afresh on every (re)start:
//!
//! - [`SpawnTarget::Command`] starts an OS subprocess and bridges its stdio
//!   onto a [`ProcessChannel`]: commands are written to the child's stdin,
//!   envelopes are read from its stdout (one JSON object per line).
//! - [`SpawnTarget::Pool`] delegates to a [`Fork`] implementation (worker pools,
//!   in-process hosts, test doubles).
//!
//! ## Subprocess bridge
//! ```text
//! ProcessChannel ── Command ──► writer task ──► child stdin   (closed when the channel drops)
//! ProcessChannel ◄── Status ─── reader task ◄── child stdout  (non-envelope lines ignored)
//! ProcessChannel ── Signal ───► waiter task ──► kill(pid, sig) / start_kill()
//! ProcessChannel ◄── Exit ───── waiter task ◄── child.wait()
//! ```

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tracing::{debug, trace, warn};

use super::pair::RawPeer;
use super::{Exit, ProcessChannel, Signal};
use crate::error::ChannelError;
use crate::protocol::{self, Control};

/// Environment variable set for subprocess workers; its presence tells the
/// worker engine that a parent is listening on stdio.
pub const CHANNEL_ENV: &str = "PROCVISOR_CHANNEL";

/// Pool-style spawn strategy: produces a fresh channel to a new pool member.
pub trait Fork: Send + Sync + 'static {
    fn fork(&self) -> Result<ProcessChannel, ChannelError>;

    /// Short label used as the worker's initial title.
    fn name(&self) -> String {
        "pool".to_string()
    }
}

/// Subprocess spawn descriptor.
#[derive(Clone, Debug)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub env: Vec<(OsString, OsString)>,
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

/// What to spawn for one worker slot.
#[derive(Clone)]
pub enum SpawnTarget {
    Command(CommandSpec),
    Pool(Arc<dyn Fork>),
}

impl SpawnTarget {
    pub fn command(program: impl Into<PathBuf>) -> Self {
        SpawnTarget::Command(CommandSpec::new(program))
    }

    pub fn pool(fork: impl Fork) -> Self {
        SpawnTarget::Pool(Arc::new(fork))
    }

    /// Initial title of a slot, before its worker reports one.
    pub fn label(&self) -> String {
        match self {
            SpawnTarget::Command(spec) => format!("[{}]", spec.program.display()),
            SpawnTarget::Pool(fork) => format!("[{}]", fork.name()),
        }
    }

    pub(crate) fn spawn(&self) -> Result<ProcessChannel, ChannelError> {
        match self {
            SpawnTarget::Command(spec) => {
                debug!(program = %spec.program.display(), "forking as child process");
                spawn_command(spec)
            }
            SpawnTarget::Pool(fork) => {
                debug!(pool = %fork.name(), "forking as pool member");
                fork.fork()
            }
        }
    }
}

impl fmt::Debug for SpawnTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnTarget::Command(spec) => f.debug_tuple("Command").field(spec).finish(),
            SpawnTarget::Pool(fork) => f.debug_tuple("Pool").field(&fork.name()).finish(),
        }
    }
}

impl From<CommandSpec> for SpawnTarget {
    fn from(spec: CommandSpec) -> Self {
        SpawnTarget::Command(spec)
    }
}

impl From<&str> for SpawnTarget {
    fn from(program: &str) -> Self {
        SpawnTarget::command(program)
    }
}

impl From<PathBuf> for SpawnTarget {
    fn from(program: PathBuf) -> Self {
        SpawnTarget::command(program)
    }
}

fn spawn_command(spec: &CommandSpec) -> Result<ProcessChannel, ChannelError> {
    let mut cmd = tokio::process::Command::new(&spec.program);
    cmd.args(&spec.args)
        .envs(spec.env.iter().map(|(k, v)| (k, v)))
        .env(CHANNEL_ENV, "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());
    if let Some(dir) = &spec.current_dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn()?;
    let pid = child.id();
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();

    let (channel, raw) = ProcessChannel::raw(pid);
    let RawPeer {
        mut commands,
        statuses,
        connected,
        process,
    } = raw;

    if let Some(mut stdin) = stdin {
        tokio::spawn(async move {
            while let Some(command) = commands.recv().await {
                let mut line = match protocol::encode(command) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(?pid, error = %e, "cannot encode command");
                        continue;
                    }
                };
                line.push('\n');
                if stdin.write_all(line.as_bytes()).await.is_err() || stdin.flush().await.is_err()
                {
                    break;
                }
            }
            // stdin closes once the master drops the channel; workers read EOF as parent loss.
        });
    }

    tokio::spawn(async move {
        if let Some(stdout) = stdout {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match protocol::decode(&line) {
                        Ok(Some(Control::Status(status))) => {
                            if statuses.send(status).is_err() {
                                break;
                            }
                        }
                        Ok(Some(Control::Command(_))) | Ok(None) => {
                            trace!(?pid, %line, "worker output");
                        }
                        Err(e) => {
                            warn!(?pid, error = %e, label = e.as_label(), "ignoring worker message");
                        }
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!(?pid, error = %e, "worker stdout failed");
                        break;
                    }
                }
            }
        }
        connected.store(false, Ordering::Release);
    });

    tokio::spawn(supervise_child(child, pid, process));

    Ok(channel)
}

async fn supervise_child(mut child: Child, pid: Option<u32>, mut process: super::PeerProcess) {
    let mut signals_open = true;
    loop {
        tokio::select! {
            status = child.wait() => {
                let exit = match status {
                    Ok(status) => Exit::from_status(status),
                    Err(e) => {
                        warn!(?pid, error = %e, "cannot observe worker exit");
                        Exit::default()
                    }
                };
                debug!(?pid, %exit, "worker process exited");
                process.report_exit(exit);
                break;
            }
            signal = process.next_signal(), if signals_open => match signal {
                Some(signal) => deliver(&mut child, pid, signal),
                None => signals_open = false,
            },
        }
    }
}

fn deliver(child: &mut Child, pid: Option<u32>, signal: Signal) {
    debug!(?pid, %signal, "signalling worker");
    let result = match (signal, pid) {
        (Signal::Kill, _) | (_, None) => child.start_kill().map_err(|e| e.to_string()),
        #[cfg(unix)]
        (signal, Some(pid)) => send_unix(pid, signal),
        #[cfg(not(unix))]
        (_, Some(_)) => child.start_kill().map_err(|e| e.to_string()),
    };
    if let Err(reason) = result {
        let err = ChannelError::Signal { signal, reason };
        warn!(?pid, error = %err, label = err.as_label(), "signal delivery failed");
    }
}

#[cfg(unix)]
fn send_unix(pid: u32, signal: Signal) -> Result<(), String> {
    use nix::sys::signal::{kill, Signal as Nix};
    use nix::unistd::Pid;

    let sig = match signal {
        Signal::Interrupt => Nix::SIGINT,
        Signal::Terminate => Nix::SIGTERM,
        Signal::Kill => Nix::SIGKILL,
        Signal::Other(n) => Nix::try_from(n).map_err(|e| e.to_string())?,
    };
    kill(Pid::from_raw(pid as i32), sig).map_err(|e| e.to_string())
}
