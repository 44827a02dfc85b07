//! # Supervisor configuration.
//!
//! Provides [`SupervisorConfig`], centralized settings for one supervisor.
//!
//! ## Sentinel values
//! - `kill_timeout = 0s` → escalate to `SIGKILL` immediately after the graceful request
//! - `management = None` → no management interface

use std::time::Duration;

use crate::policies::RestartPolicy;

/// Configuration of a [`Supervisor`](crate::Supervisor).
///
/// Start/stop hooks are not part of the config; pass them to
/// [`SupervisorBuilder::on_start`](crate::SupervisorBuilder::on_start) and
/// [`SupervisorBuilder::on_stop`](crate::SupervisorBuilder::on_stop).
///
/// ## Field semantics
/// - `kill_timeout`: time a worker gets to exit after a stop request before `SIGKILL`
/// - `ready_timeout`: deadline for the `ready` status after spawn
/// - `start_timeout`: deadline for the `started` status after the start command
/// - `restart_delay`: wait between an unexpected exit and the automatic restart
/// - `restarts`: automatic restart cap per worker slot
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `management`: optional management interface settings
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    pub kill_timeout: Duration,
    pub ready_timeout: Duration,
    pub start_timeout: Duration,
    pub restart_delay: Duration,
    pub restarts: RestartPolicy,
    pub bus_capacity: usize,
    pub management: Option<ManagementConfig>,
}

impl SupervisorConfig {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Convenience setter for the restart cap from a plain count (`-1` = unbounded).
    pub fn with_restarts(mut self, count: i64) -> Self {
        self.restarts = RestartPolicy::from_count(count);
        self
    }

    pub fn with_kill_timeout(mut self, timeout: Duration) -> Self {
        self.kill_timeout = timeout;
        self
    }

    pub fn with_management(mut self, management: ManagementConfig) -> Self {
        self.management = Some(management);
        self
    }
}

impl Default for SupervisorConfig {
    /// Default configuration:
    ///
    /// - `kill_timeout = 5s`
    /// - `ready_timeout = 10s`, `start_timeout = 10s`
    /// - `restart_delay = 1s`
    /// - `restarts = RestartPolicy::Disabled`
    /// - `bus_capacity = 1024`
    /// - `management = None`
    fn default() -> Self {
        Self {
            kill_timeout: Duration::from_secs(5),
            ready_timeout: Duration::from_secs(10),
            start_timeout: Duration::from_secs(10),
            restart_delay: Duration::from_secs(1),
            restarts: RestartPolicy::Disabled,
            bus_capacity: 1024,
            management: None,
        }
    }
}

/// Settings of the [`ManagementInterface`](crate::ManagementInterface).
#[derive(Clone, Debug)]
pub struct ManagementConfig {
    /// Whether worker events are echoed to attached consoles from the start.
    pub echo: bool,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self { echo: true }
    }
}
