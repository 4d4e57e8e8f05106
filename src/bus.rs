use crate::{
    data::{Measurements, Metadata},
    error::MetricError,
    name::EventName,
};
use fnv::FnvBuildHasher;
use hashbrown::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

type Callback = Arc<dyn Fn(&EventName, &Measurements, &Metadata) + Send + Sync>;

struct Handler {
    id: String,
    callback: Callback,
}

/// A synchronous in-process pub/sub bus keyed by hierarchical event names.
///
/// `EventBus` is a cheap cloneable handle; clones share one handler registry.
/// Publications are delivered inline on the publisher's thread, in
/// subscription order, to every handler registered under exactly the
/// published event name.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<RwLock<HashMap<EventName, Vec<Handler>, FnvBuildHasher>>>,
}

impl EventBus {
    /// Creates a bus with an empty handler registry.
    pub fn new() -> EventBus {
        Default::default()
    }

    /// Registers `callback` under `event_name`.
    ///
    /// Handler ids are unique across the whole bus, not per event name, so an
    /// id registered anywhere makes a second `subscribe` fail.
    pub fn subscribe<N, F>(&self, id: &str, event_name: N, callback: F) -> Result<(), MetricError>
    where
        N: Into<EventName>,
        F: Fn(&EventName, &Measurements, &Metadata) + Send + Sync + 'static,
    {
        let event_name = event_name.into();
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        if handlers.values().flatten().any(|handler| handler.id == id) {
            return Err(MetricError::DuplicateHandler { id: id.to_string() });
        }

        handlers.entry(event_name).or_default().push(Handler {
            id: id.to_string(),
            callback: Arc::new(callback),
        });
        Ok(())
    }

    /// Removes the handler registered under `id`, wherever it is registered.
    ///
    /// Unsubscribing an unknown id is a no-op.
    pub fn unsubscribe(&self, id: &str) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        for group in handlers.values_mut() {
            group.retain(|handler| handler.id != id);
        }
        handlers.retain(|_, group| !group.is_empty());
    }

    #[cfg(test)]
    pub(crate) fn handler_count(&self) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.values().map(Vec::len).sum()
    }

    /// Delivers an event to every handler subscribed to `event_name`.
    pub fn publish(&self, event_name: &EventName, measurements: &Measurements, metadata: &Metadata) {
        // Handlers are snapshotted out of the registry lock before being
        // invoked, so a handler may itself publish or subscribe.
        let callbacks: Vec<Callback> = {
            let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            handlers
                .get(event_name)
                .map(|group| group.iter().map(|handler| handler.callback.clone()).collect())
                .unwrap_or_default()
        };

        for callback in callbacks {
            callback(event_name, measurements, metadata);
        }
    }
}
