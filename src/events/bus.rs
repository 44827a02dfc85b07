//! # Event bus for broadcasting supervisor events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`]. Every worker
//! actor and the supervisor publish into one bus; the supervisor's listener
//! fans events out to the [`SubscriberSet`](crate::SubscriberSet), and
//! [`Supervisor::subscribe`](crate::Supervisor::subscribe) hands out raw receivers.
//!
//! ```text
//! Publishers (many):                 Consumers:
//!   WorkerActor 0 ──┐
//!   WorkerActor 1 ──┼──► Bus ──┬──► subscriber listener ──► SubscriberSet
//!   Supervisor    ──┘          └──► Supervisor::subscribe() receivers
//! ```
//!
//! ## Rules
//! - `publish()` never blocks.
//! - Bounded ring buffer shared by all receivers; slow receivers observe `Lagged(n)`.
//! - Events are lost if nobody is subscribed at send time.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for supervisor events.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given capacity (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver that observes events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
