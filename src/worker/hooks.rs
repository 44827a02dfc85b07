//! # Start/stop hooks.
//!
//! [`Hooks`] is the pair of user callbacks a [`Worker`](crate::Worker) drives.
//! A hook "calls done" by completing its future; a hook that never completes
//! blocks the corresponding transition (the supervisor's deadlines still apply).
//!
//! [`Hook`] wraps one closure producing a fresh future per call, in the same
//! spirit as a function-backed task: no hidden state between calls; share
//! state through `Arc<...>` captured by the closure.
//!
//! ## Example
//! ```rust
//! use procvisor::{Hook, HookFn, HookError};
//!
//! let hooks = HookFn::arc(
//!     Hook::new(|| async { Ok::<_, HookError>(()) }),
//!     Hook::new(|| async { Ok::<_, HookError>(()) }),
//! );
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HookError;

/// Boxed future returned by a [`Hook`].
pub type BoxHookFuture = Pin<Box<dyn Future<Output = Result<(), HookError>> + Send + 'static>>;

/// Start/stop callbacks of a supervised unit.
#[async_trait]
pub trait Hooks: Send + Sync + 'static {
    /// Performs the startup work; completion is reported upstream as `started`.
    async fn start(&self) -> Result<(), HookError>;

    /// Releases resources; completion is reported upstream as `stopped`.
    async fn stop(&self) -> Result<(), HookError>;
}

/// One closure-backed hook.
#[derive(Clone)]
pub struct Hook {
    f: Arc<dyn Fn() -> BoxHookFuture + Send + Sync>,
}

impl Hook {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        Self {
            f: Arc::new(move || -> BoxHookFuture { Box::pin(f()) }),
        }
    }

    /// Hook that completes at the next scheduling opportunity.
    pub fn noop() -> Self {
        Self::new(|| async {
            tokio::task::yield_now().await;
            Ok(())
        })
    }

    pub fn call(&self) -> BoxHookFuture {
        (self.f)()
    }
}

impl Default for Hook {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Hook")
    }
}

/// [`Hooks`] built from two [`Hook`]s.
#[derive(Clone, Debug, Default)]
pub struct HookFn {
    start: Hook,
    stop: Hook,
}

impl HookFn {
    pub fn new(start: Hook, stop: Hook) -> Self {
        Self { start, stop }
    }

    pub fn arc(start: Hook, stop: Hook) -> Arc<Self> {
        Arc::new(Self::new(start, stop))
    }
}

#[async_trait]
impl Hooks for HookFn {
    async fn start(&self) -> Result<(), HookError> {
        self.start.call().await
    }

    async fn stop(&self) -> Result<(), HookError> {
        self.stop.call().await
    }
}
