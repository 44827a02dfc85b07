use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{actor::WorkerActor, config::SupervisorConfig, supervisor::Supervisor};
use crate::{
    channel::SpawnTarget,
    events::Bus,
    subscribers::{ManagementInterface, Subscribe, SubscriberSet},
    worker::Hook,
};

/// Builder for constructing a [`Supervisor`] with hooks and observers.
pub struct SupervisorBuilder {
    cfg: SupervisorConfig,
    targets: Vec<SpawnTarget>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    on_start: Hook,
    on_stop: Hook,
}

impl SupervisorBuilder {
    /// Creates a new builder for `targets` (start order) with the given configuration.
    pub fn new(targets: Vec<SpawnTarget>, cfg: SupervisorConfig) -> Self {
        Self {
            cfg,
            targets,
            subscribers: Vec::new(),
            on_start: Hook::noop(),
            on_stop: Hook::noop(),
        }
    }

    /// Hook run before the first worker is spawned.
    pub fn on_start(mut self, hook: Hook) -> Self {
        self.on_start = hook;
        self
    }

    /// Hook run when the stop sequence begins, before workers are stopped.
    pub fn on_stop(mut self, hook: Hook) -> Self {
        self.on_stop = hook;
        self
    }

    /// Sets event subscribers.
    ///
    /// Subscribers receive worker and supervisor events through dedicated
    /// workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the Supervisor and spawns one actor per target.
    ///
    /// Must be called from within a Tokio runtime. If
    /// [`SupervisorConfig::management`] is set, a [`ManagementInterface`] is
    /// created over the worker list and registered as a subscriber.
    pub fn build(self) -> Arc<Supervisor> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let shutting_down = Arc::new(AtomicBool::new(false));
        let token = CancellationToken::new();

        let workers: Vec<_> = self
            .targets
            .into_iter()
            .enumerate()
            .map(|(id, target)| {
                WorkerActor::spawn(
                    id,
                    target,
                    &self.cfg,
                    bus.clone(),
                    Arc::clone(&shutting_down),
                    token.child_token(),
                )
            })
            .collect();

        let mut subscribers = self.subscribers;
        let management = self.cfg.management.as_ref().map(|mcfg| {
            let mgmt = Arc::new(ManagementInterface::new(workers.clone(), mcfg));
            subscribers.push(mgmt.clone() as Arc<dyn Subscribe>);
            mgmt
        });
        let subs = Arc::new(SubscriberSet::new(subscribers, bus.clone()));

        let sup = Arc::new(Supervisor::new_internal(
            self.cfg,
            bus,
            subs,
            workers,
            self.on_start,
            self.on_stop,
            shutting_down,
            management,
            token,
        ));
        sup.subscriber_listener();
        sup
    }
}
