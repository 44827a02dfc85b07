//! # Master
//!
//! Supervises two `job_worker` processes:
//! - `ingest` runs until stopped
//! - `flaky` crashes after two batches and is restarted (at most twice)
//!
//! Worker events are logged through [`LogWriter`] and echoed by the
//! management interface. Press Ctrl-C to stop: every worker gets a graceful
//! stop request and is killed if it has not exited 3s later.
//!
//! ## Run
//! ```bash
//! cargo build --example job_worker
//! cargo run --example master --features logging
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use procvisor::{
    CommandSpec, LogWriter, ManagementConfig, Subscribe, Supervisor, SupervisorConfig,
};

/// `job_worker` is built next to this binary under `target/<profile>/examples/`.
fn job_worker() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("job_worker")))
        .unwrap_or_else(|| PathBuf::from("job_worker"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let bin = job_worker();
    let cfg = SupervisorConfig::default()
        .with_restarts(2)
        .with_kill_timeout(Duration::from_secs(3))
        .with_management(ManagementConfig::default());

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let sup = Supervisor::builder(
        [
            CommandSpec::new(bin.clone()).arg("ingest"),
            CommandSpec::new(bin).args(["flaky", "2"]),
        ],
        cfg,
    )
    .with_subscribers(subs)
    .build();

    if let Some(mgmt) = sup.management() {
        for line in mgmt.help() {
            println!("{line}");
        }
        let mut console = mgmt.attach();
        tokio::spawn(async move {
            while let Some(line) = console.recv().await {
                println!("{line}");
            }
        });
    }

    sup.run().await?;
    Ok(())
}
