//! # Handshake race.
//!
//! One handshake step waits for a specific status from the worker while
//! racing three other things:
//!
//! ```text
//!            ┌─ status == expected ─► Received(status)
//! select! ───┼─ process exited ─────► Exited(exit)
//!            ├─ deadline elapsed ───► TimedOut
//!            └─ request arrived ────► Interrupted(request)
//! ```
//!
//! The first branch to resolve wins; the others are dropped, which cancels
//! them. `Interrupted` hands the request back to the caller, who can answer it
//! and call again with the same deadline.
//!
//! Statuses other than `expected` are logged and skipped. Statuses win ties
//! with the exit so a worker that reports and then dies is seen reporting.

use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::debug;

use super::handle::Request;
use crate::channel::{Exit, ProcessChannel};
use crate::protocol::{Status, StatusKind};

#[derive(Debug)]
pub(crate) enum Outcome {
    Received(Status),
    TimedOut,
    Exited(Exit),
    Interrupted(Request),
}

pub(crate) async fn await_status(
    channel: &mut ProcessChannel,
    expected: StatusKind,
    deadline: Instant,
    requests: &mut mpsc::UnboundedReceiver<Request>,
) -> Outcome {
    let pid = channel.pid();
    let inbound = &mut channel.inbound;
    let exit = &mut channel.exit;
    let sleep = time::sleep_until(deadline);
    tokio::pin!(sleep);
    let mut requests_open = true;

    loop {
        tokio::select! {
            biased;
            status = inbound.recv(), if inbound.is_open() => match status {
                Some(status) if status.status == expected => return Outcome::Received(status),
                Some(status) => {
                    debug!(?pid, got = status.status.as_str(), want = expected.as_str(), "ignoring status");
                }
                None => debug!(?pid, "worker stopped talking"),
            },
            exited = exit.wait() => return Outcome::Exited(exited),
            _ = &mut sleep => return Outcome::TimedOut,
            request = requests.recv(), if requests_open => match request {
                Some(request) => return Outcome::Interrupted(request),
                None => requests_open = false,
            },
        }
    }
}
