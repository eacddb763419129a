//! Named-event listener registry.

use std::{collections::HashMap, sync::Arc};

use serde_json::Value;

use crate::path::PathBuf;

/// Payload passed to every listener.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Name of the mirrored object.
    pub name: String,
    /// Path that changed; `None` for a root replacement or an initial sync.
    pub changed_path: Option<PathBuf>,
    /// The mirror's data after the change.
    pub data: Value,
}

/// A registered callback.
pub type Listener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Handle for removing a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered listeners per event name. An event with no listeners has no entry.
#[derive(Default)]
pub struct Listeners {
    next_id: u64,
    events: HashMap<String, Vec<(ListenerId, Listener)>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener for `event`.
    pub fn add(&mut self, event: &str, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.events
            .entry(event.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    /// Remove one listener. Removing the last listener for an event drops the event.
    pub fn remove(&mut self, event: &str, id: ListenerId) -> bool {
        let Some(listeners) = self.events.get_mut(event) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        let removed = listeners.len() != before;
        if listeners.is_empty() {
            self.events.remove(event);
        }
        removed
    }

    /// Remove every listener for `event`, or for every event when `None`.
    pub fn remove_all(&mut self, event: Option<&str>) {
        match event {
            Some(event) => {
                self.events.remove(event);
            }
            None => self.events.clear(),
        }
    }

    /// Number of listeners registered for `event`.
    pub fn count(&self, event: &str) -> usize {
        self.events.get(event).map_or(0, Vec::len)
    }

    /// Check whether any listener is registered for `event`.
    pub fn has_event(&self, event: &str) -> bool {
        self.events.contains_key(event)
    }

    /// The listeners for `event` in registration order.
    pub fn snapshot(&self, event: &str) -> Vec<Listener> {
        self.events
            .get(event)
            .map(|listeners| listeners.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default()
    }
}
