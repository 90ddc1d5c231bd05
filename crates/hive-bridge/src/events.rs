//! Event listeners for unsolicited envelopes.
//!
//! Listeners run synchronously on the session's routing task, in arrival
//! order, so they must not block. Callers that prefer a stream can
//! [`EventHub::subscribe`] instead; a lagging subscriber loses the oldest
//! events rather than stalling the router.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use hive_types::event_name_for_callback;
use serde_json::Value;
use tokio::sync::broadcast;

/// Capacity of the broadcast buffer behind [`EventHub::subscribe`].
const EVENT_BUFFER: usize = 256;

/// An unsolicited event received from the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Wire name, e.g. `loadFinished` or `jsError`.
    pub name: String,
    pub args: Vec<Value>,
}

type Listener = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Per-entity listener table plus a broadcast stream of every event.
pub struct EventHub {
    listeners: Mutex<HashMap<String, Vec<Listener>>>,
    stream: broadcast::Sender<Event>,
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub").finish_non_exhaustive()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    pub fn new() -> Self {
        let (stream, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            listeners: Mutex::new(HashMap::new()),
            stream,
        }
    }

    /// Register `listener` for `name`.
    ///
    /// Engine callback names (`onLoadFinished`) are accepted and stored
    /// under their wire name (`loadFinished`).
    pub fn on<F>(&self, name: &str, listener: F)
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        let name = event_name_for_callback(name);
        self.lock().entry(name).or_default().push(Arc::new(listener));
    }

    /// Receive every event from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.stream.subscribe()
    }

    /// Deliver an event to its listeners and subscribers.
    ///
    /// Returns how many listeners were invoked.
    pub fn emit(&self, name: &str, args: &[Value]) -> usize {
        let name = event_name_for_callback(name);
        // Listeners may register more listeners; never call them under the lock.
        let listeners: Vec<Listener> = self.lock().get(&name).cloned().unwrap_or_default();
        for listener in &listeners {
            listener(args);
        }
        let _ = self.stream.send(Event {
            name,
            args: args.to_vec(),
        });
        listeners.len()
    }

    /// Drop every registered listener.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Listener>>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}
