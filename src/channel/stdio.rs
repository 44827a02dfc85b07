//! Worker-side stdio transport: the parent writes commands to our stdin and
//! reads envelopes from our stdout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::ParentLink;
use crate::protocol::{self, Control, Status};

/// Builds a [`ParentLink`] over the process' stdin/stdout.
///
/// The command stream ends (parent unreachable) when stdin reaches EOF.
pub(crate) fn stdio_link() -> ParentLink {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (status_tx, mut status_rx) = mpsc::unbounded_channel::<Status>();
    let (flush_tx, flush_rx) = oneshot::channel();
    let connected = Arc::new(AtomicBool::new(true));

    let reader_connected = Arc::clone(&connected);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match protocol::decode(&line) {
                    Ok(Some(Control::Command(command))) => {
                        if cmd_tx.send(command).is_err() {
                            break;
                        }
                    }
                    Ok(Some(Control::Status(status))) => {
                        debug!(status = status.status.as_str(), "ignoring status sent to a worker");
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, label = e.as_label(), "ignoring master message");
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "reading from master failed");
                    break;
                }
            }
        }
        reader_connected.store(false, Ordering::Release);
    });

    tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(status) = status_rx.recv().await {
            let mut line = match protocol::encode(status) {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "cannot encode status");
                    continue;
                }
            };
            line.push('\n');
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
        let _ = stdout.flush().await;
        let _ = flush_tx.send(());
    });

    ParentLink::new(cmd_rx, status_tx, connected).with_flush(flush_rx)
}
