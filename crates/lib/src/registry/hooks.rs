//! Registry hooks for observing object creation and collection.
//!
//! Hooks let external observers (audit logs, persistence layers, metrics) follow
//! the lifecycle of named objects without the registry knowing about them.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::Result;

/// Context passed to registry hooks.
#[derive(Debug, Clone)]
pub struct ObjectEvent {
    /// Name of the object
    pub name: String,
    /// When the object was created
    pub created_at: DateTime<Utc>,
}

/// Trait for observing object lifecycle events.
///
/// Hooks run synchronously on the thread that caused the event, with no registry
/// lock held, so they may query the registry.
pub trait RegistryHook: Send + Sync {
    /// Called after an object is registered. A connect that creates the object
    /// attaches its connection only after every creation hook has returned.
    ///
    /// An object observed here may still be collected without ever gaining a
    /// subscriber.
    fn on_object_created(&self, _event: &ObjectEvent) -> Result<()> {
        Ok(())
    }

    /// Called after an object is removed from the registry.
    fn on_object_collected(&self, _event: &ObjectEvent) -> Result<()> {
        Ok(())
    }
}

/// A collection of registry hooks executed in registration order.
#[derive(Default, Clone)]
pub struct RegistryHookCollection {
    hooks: Vec<Arc<dyn RegistryHook>>,
}

impl RegistryHookCollection {
    /// Create a new empty hook collection.
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Add a hook to the collection.
    pub fn add_hook(&mut self, hook: Arc<dyn RegistryHook>) {
        self.hooks.push(hook);
    }

    /// Run every creation hook.
    ///
    /// If a hook fails, execution continues with the remaining hooks and the first
    /// error is returned.
    pub fn object_created(&self, event: &ObjectEvent) -> Result<()> {
        self.run(event, |hook, event| hook.on_object_created(event))
    }

    /// Run every collection hook. Failures are handled as in [`object_created`](Self::object_created).
    pub fn object_collected(&self, event: &ObjectEvent) -> Result<()> {
        self.run(event, |hook, event| hook.on_object_collected(event))
    }

    fn run(
        &self,
        event: &ObjectEvent,
        call: impl Fn(&dyn RegistryHook, &ObjectEvent) -> Result<()>,
    ) -> Result<()> {
        let mut first_error = None;

        for hook in &self.hooks {
            if let Err(e) = call(hook.as_ref(), event) {
                tracing::error!(name = %event.name, "Registry hook failed: {e}");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Get the number of registered hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Check if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}
