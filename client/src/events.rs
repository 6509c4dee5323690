//! Publish/subscribe for unsolicited server events.
//!
//! Listeners are keyed by event name and invoked in registration order.
//! Registration returns a [`Subscription`] guard; dropping it unregisters
//! the listener, so re-initialising a consumer never stacks duplicates.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde_json::Value;

pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<String, Vec<(u64, Listener)>>,
}

/// Event fan-out shared by the reader task and subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `event`.
    pub fn subscribe<F>(&self, event: &str, listener: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .listeners
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(listener)));

        Subscription {
            registry: Arc::downgrade(&self.registry),
            event: event.to_string(),
            id,
        }
    }

    /// Deliver `body` to every listener of `event`. Returns how many ran.
    ///
    /// The registry lock is not held while listeners run, so a listener may
    /// subscribe or unsubscribe without deadlocking. A panicking listener is
    /// logged and the remaining listeners still run.
    pub fn dispatch(&self, event: &str, body: &Value) -> usize {
        let listeners: Vec<Listener> = {
            let registry = self.lock();
            match registry.listeners.get(event) {
                Some(list) => list.iter().map(|(_, l)| Arc::clone(l)).collect(),
                None => Vec::new(),
            }
        };

        if listeners.is_empty() {
            tracing::trace!(event, "No listeners for server event");
            return 0;
        }

        for listener in &listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(body))).is_err() {
                tracing::warn!(event, "Event listener panicked");
            }
        }
        listeners.len()
    }

    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.lock().listeners.get(event).map_or(0, Vec::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.lock();
        f.debug_struct("EventBus")
            .field("events", &registry.listeners.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Unsubscribe handle. The listener stays registered while this is alive.
#[must_use = "dropping a Subscription unregisters the listener"]
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    event: String,
    id: u64,
}

impl Subscription {
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = registry.listeners.get_mut(&self.event) {
            list.retain(|(id, _)| *id != self.id);
            if list.is_empty() {
                registry.listeners.remove(&self.event);
            }
        }
    }
}
