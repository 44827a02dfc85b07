//! Restart policies.
//!
//! ## Contents
//! - [`RestartPolicy`] how many automatic restarts a worker slot gets (disabled / limited / unbounded)
//!
//! ## Quick wiring
//! ```text
//! SupervisorConfig { restarts: RestartPolicy, restart_delay: Duration }
//!      └─► core::actor::WorkerActor uses:
//!           - restarts.allows(automatic) to arm the restart monitor after each start
//!           - restart_delay before re-running the start handshake
//! ```

mod restart;

pub use restart::RestartPolicy;
