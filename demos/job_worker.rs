//! # Job worker
//!
//! A supervised process that works through batches. It marks itself busy
//! while a batch runs, so a stop request waits for the batch to finish.
//!
//! Usage: `job_worker [title] [crash_after_batches]`. With a crash count the
//! process exits with status 1 after that many batches, which lets the
//! master's restart policy kick in.
//!
//! ## Run
//! ```bash
//! # standalone: starts on its own, Ctrl-C to stop
//! cargo run --example job_worker -- ingest
//!
//! # supervised: see the `master` example
//! ```
//!
//! Logs go to stderr; stdout carries the control channel when supervised.

use std::sync::Arc;
use std::time::Duration;

use procvisor::{Hook, HookFn, Worker};
use tokio::sync::Notify;
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut args = std::env::args().skip(1);
    let title = args.next().unwrap_or_else(|| "job".to_string());
    let crash_after: Option<u64> = args.next().map(|n| n.parse()).transpose()?;

    let go = Arc::new(Notify::new());
    let hooks = HookFn::arc(
        Hook::new({
            let go = Arc::clone(&go);
            move || {
                let go = Arc::clone(&go);
                async move {
                    // Pretend to open connections.
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    go.notify_one();
                    Ok(())
                }
            }
        }),
        Hook::new(|| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            info!("connections closed");
            Ok(())
        }),
    );

    let worker = Worker::new(title.as_str(), hooks);
    let control = worker.control();
    let mut events = worker.subscribe();

    tokio::spawn(async move {
        while let Ok(ev) = events.recv().await {
            info!(?ev, "lifecycle");
        }
    });

    let jobs = tokio::spawn(async move {
        go.notified().await;
        let mut batch = 0u64;
        loop {
            batch += 1;
            control.working(true);
            info!(batch, "processing batch");
            tokio::time::sleep(Duration::from_millis(1500)).await;
            control.working(false);

            if crash_after == Some(batch) {
                info!(batch, "simulating a crash");
                std::process::exit(1);
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    });

    worker.run().await?;
    jobs.abort();
    info!(%title, "bye");
    Ok(())
}
