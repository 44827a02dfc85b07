//! # Event subscribers.
//!
//! [`Subscribe`] is the observer interface; [`SubscriberSet`] fans events out
//! to every registered subscriber through its own bounded queue.
//!
//! ```text
//!   WorkerActor ── publish(Event) ──► Bus ──► subscriber listener ──► SubscriberSet
//!                                                                  ┌────┴─────┬──────────────┐
//!                                                                  ▼          ▼              ▼
//!                                                              LogWriter  Management    custom ...
//! ```
//!
//! ## Built-ins
//! - [`LogWriter`] renders events through `tracing` (feature `logging`).
//! - [`ManagementInterface`] worker list and console echo, enabled through
//!   [`SupervisorConfig::management`](crate::SupervisorConfig::management).

#[cfg(feature = "logging")]
mod embedded;
mod management;
mod subscriber;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub use management::ManagementInterface;
pub use subscriber::Subscribe;
pub use subscriber_set::SubscriberSet;
