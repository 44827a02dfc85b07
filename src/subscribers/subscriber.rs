//! # Event subscriber trait.
//!
//! [`Subscribe`] is the observer-registration interface of the supervisor:
//! anything that wants to react to worker transitions implements it and is
//! handed to [`SupervisorBuilder::with_subscribers`](crate::SupervisorBuilder::with_subscribers).
//!
//! Each subscriber gets:
//! - a dedicated worker task,
//! - a bounded queue (capacity via [`Subscribe::queue_capacity`]),
//! - panic isolation (reported as `EventKind::SubscriberPanicked`).
//!
//! ```text
//! SubscriberSet ──► [bounded queue] ──► worker task ──► subscriber.on_event()
//!                                    └─► panic caught → EventKind::SubscriberPanicked
//! ```
//!
//! ## Rules
//! - A slow subscriber only affects its own queue.
//! - Queue overflow drops the event for this subscriber only and publishes
//!   `EventKind::SubscriberOverflow`.
//! - Events are processed sequentially (FIFO) per subscriber.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use procvisor::{Event, EventKind, Subscribe};
//!
//! struct Alerts;
//!
//! #[async_trait]
//! impl Subscribe for Alerts {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::WorkerKilled {
//!             // page someone
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "alerts" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Observer of supervisor events.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event, from the subscriber's own worker task.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow/panic events.
    ///
    /// The default uses `type_name::<Self>()`; override it with something short.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity, clamped to at least 1. Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
