#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use procvisor::protocol::{Action, Status, StatusKind};
use procvisor::{
    ChannelError, ChannelPeer, Event, EventKind, Exit, Fork, ProcessChannel, Signal, SpawnTarget,
};
use tokio::sync::broadcast;

/// How a scripted worker process behaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Behavior {
    /// Full handshake, exits 0 after a stop command.
    Graceful,
    /// Never reports ready; dies on any signal.
    NeverReady,
    /// Reports ready, exits with the code when told to start.
    ExitOnStart(i32),
    /// Full handshake, then exits with the code right away.
    CrashAfterStart(i32),
    /// Full handshake, ignores stop commands and catchable signals.
    IgnoreStop,
    /// Reports ready but never acknowledges the start command.
    NeverStarted,
    /// Reports ready, is terminated by the signal when told to start.
    SignaledOnStart(Signal),
    /// Full handshake, then is terminated by the signal right away.
    SignaledAfterStart(Signal),
}

/// Shared trace of what scripted processes did.
#[derive(Clone, Default)]
pub struct Trace(Arc<Mutex<Vec<String>>>);

impl Trace {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }
}

/// In-memory pool: every fork hosts one scripted process on a tokio task.
pub struct ScriptedPool {
    name: &'static str,
    script: Mutex<VecDeque<Behavior>>,
    last: Behavior,
    trace: Trace,
    forks: Arc<AtomicUsize>,
}

impl ScriptedPool {
    /// Forks follow `script` in order; the last behavior repeats.
    pub fn new(name: &'static str, script: &[Behavior], trace: &Trace) -> Self {
        Self {
            name,
            script: Mutex::new(script.iter().copied().collect()),
            last: *script.last().unwrap_or(&Behavior::Graceful),
            trace: trace.clone(),
            forks: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn target(name: &'static str, behavior: Behavior, trace: &Trace) -> SpawnTarget {
        SpawnTarget::pool(Self::new(name, &[behavior], trace))
    }

    pub fn forks(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.forks)
    }
}

impl Fork for ScriptedPool {
    fn fork(&self) -> Result<ProcessChannel, ChannelError> {
        let behavior = self.script.lock().unwrap().pop_front().unwrap_or(self.last);
        let n = self.forks.fetch_add(1, Ordering::SeqCst) + 1;
        self.trace.push(format!("fork:{}", self.name));
        let (channel, peer) = ProcessChannel::pair(Some(1000 + n as u32));
        tokio::spawn(host(peer, self.name, behavior, self.trace.clone()));
        Ok(channel)
    }

    fn name(&self) -> String {
        self.name.to_string()
    }
}

async fn host(peer: ChannelPeer, name: &'static str, behavior: Behavior, trace: Trace) {
    let (mut link, mut process) = peer.split();
    if behavior != Behavior::NeverReady {
        let _ = link.send(Status::new(StatusKind::Ready, name));
    }

    loop {
        tokio::select! {
            command = link.recv() => match command.map(|c| c.action) {
                Some(Action::Start) => match behavior {
                    Behavior::ExitOnStart(code) => {
                        process.report_exit(Exit::code(code));
                        return;
                    }
                    Behavior::CrashAfterStart(code) => {
                        let _ = link.send(Status::new(StatusKind::Started, name));
                        trace.push(format!("started:{name}"));
                        tokio::task::yield_now().await;
                        process.report_exit(Exit::code(code));
                        return;
                    }
                    Behavior::NeverStarted => trace.push(format!("ignored-start:{name}")),
                    Behavior::SignaledOnStart(signal) => {
                        process.report_exit(Exit::signaled(signal));
                        return;
                    }
                    Behavior::SignaledAfterStart(signal) => {
                        let _ = link.send(Status::new(StatusKind::Started, name));
                        trace.push(format!("started:{name}"));
                        tokio::task::yield_now().await;
                        process.report_exit(Exit::signaled(signal));
                        return;
                    }
                    _ => {
                        let _ = link.send(Status::new(StatusKind::Started, name));
                        trace.push(format!("started:{name}"));
                    }
                },
                Some(Action::Stop) => {
                    trace.push(format!("stop:{name}"));
                    if behavior == Behavior::IgnoreStop {
                        continue;
                    }
                    let _ = link.send(Status::new(StatusKind::Stopped, name));
                    link.close().await;
                    process.report_exit(Exit::code(0));
                    return;
                }
                None => {
                    process.report_exit(Exit::code(1));
                    return;
                }
            },
            signal = process.next_signal() => match signal {
                Some(Signal::Kill) => {
                    trace.push(format!("signal:{name}:SIGKILL"));
                    process.report_exit(Exit::signaled(Signal::Kill));
                    return;
                }
                Some(signal) => {
                    trace.push(format!("signal:{name}:{signal}"));
                    if behavior == Behavior::IgnoreStop {
                        continue;
                    }
                    process.report_exit(Exit::signaled(signal));
                    return;
                }
                None => return,
            },
        }
    }
}

/// Next event matching `pred`, failing the test after a generous (virtual) timeout.
pub async fn next_matching(
    rx: &mut broadcast::Receiver<Event>,
    pred: impl Fn(&Event) -> bool,
) -> Event {
    tokio::time::timeout(Duration::from_secs(600), async {
        loop {
            let ev = rx.recv().await.expect("bus closed");
            if pred(&ev) {
                return ev;
            }
        }
    })
    .await
    .expect("event never arrived")
}

/// Drains currently queued worker events as `(kind, worker id)`.
pub fn drain_worker_events(rx: &mut broadcast::Receiver<Event>) -> Vec<(EventKind, usize)> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        if let Some(id) = ev.worker_id() {
            out.push((ev.kind, id));
        }
    }
    out
}
