//! The synchronization registry: named shared states and the connections using them.
//!
//! The registry maps names to [`SharedState`]s and tracks the live connections.
//! Transports report arrivals with [`Registry::on_connection_arrive`], route each
//! request through the returned [`ConnectionScope`], and report the departure
//! exactly once when the connection closes.
//!
//! On departure the connection is unsubscribed from every registered object, and
//! every object that departure left without subscribers is collected: removed from
//! the registry and marked so that stale handles fail instead of silently diverging.
//! Objects that never had a subscriber are left for [`Registry::collect_idle`].
//!
//! Locks are always taken in the order objects, connections, shared state. Hooks
//! run with no registry lock held.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, RwLock},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    Result,
    config::RegistryConfig,
    path::Path,
    protocol::{Request, Response, Snapshot},
    state::SharedState,
    transport::{Connection, ConnectionId},
};

mod errors;
mod hooks;

pub use errors::RegistryError;
pub use hooks::{ObjectEvent, RegistryHook, RegistryHookCollection};

/// What a departure changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepartureReport {
    /// Objects the connection was unsubscribed from.
    pub unsubscribed: Vec<String>,
    /// Objects collected because they were left without subscribers.
    pub collected: Vec<String>,
}

/// Summary of one registered object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectStatus {
    pub name: String,
    pub subscribers: usize,
    pub created_at: DateTime<Utc>,
}

struct RegistryInner {
    config: RegistryConfig,
    objects: RwLock<BTreeMap<String, Arc<SharedState>>>,
    /// Live connections in arrival order.
    connections: Mutex<Vec<Arc<dyn Connection>>>,
    hooks: RwLock<RegistryHookCollection>,
}

/// Registry of named shared states.
///
/// `Registry` is a cheap handle; clones share the same objects and connections.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.inner.config)
            .field("objects", &self.object_names())
            .field("connections", &self.connection_count())
            .finish()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config,
                objects: RwLock::new(BTreeMap::new()),
                connections: Mutex::new(Vec::new()),
                hooks: RwLock::new(RegistryHookCollection::new()),
            }),
        }
    }

    /// The configuration this registry was created with.
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Register a lifecycle hook.
    pub fn add_hook(&self, hook: Arc<dyn RegistryHook>) {
        self.inner.hooks.write().unwrap().add_hook(hook);
    }

    /// Add a connection to the live set and return the request scope for it.
    ///
    /// Arriving twice with the same id keeps a single entry.
    pub fn on_connection_arrive(&self, connection: Arc<dyn Connection>) -> ConnectionScope {
        {
            let mut connections = self.inner.connections.lock().unwrap();
            if !connections.iter().any(|c| c.id() == connection.id()) {
                connections.push(connection.clone());
            }
        }
        info!(connection = %connection.id(), "Connection arrived");
        ConnectionScope {
            registry: self.clone(),
            connection,
            departed: false,
        }
    }

    /// Remove a connection from the live set and from every object, collecting empty objects.
    ///
    /// Departing a connection that is not live is a no-op.
    pub fn on_connection_depart(&self, connection: &ConnectionId) -> DepartureReport {
        let mut report = DepartureReport::default();
        let mut collected = Vec::new();
        {
            let mut objects = self.inner.objects.write().unwrap();
            {
                let mut connections = self.inner.connections.lock().unwrap();
                let before = connections.len();
                connections.retain(|c| c.id() != connection);
                if connections.len() == before {
                    return report;
                }
            }

            for (name, state) in objects.iter() {
                if !state.unsubscribe(connection) {
                    continue;
                }
                report.unsubscribed.push(name.clone());
                if state.collect_if_idle() {
                    report.collected.push(name.clone());
                }
            }

            for name in &report.collected {
                if let Some(state) = objects.remove(name) {
                    collected.push(state);
                }
            }
        }

        info!(
            connection = %connection,
            unsubscribed = report.unsubscribed.len(),
            collected = report.collected.len(),
            "Connection departed"
        );
        self.notify_collected(&collected);
        report
    }

    /// Return the object registered under `name`, creating it if needed.
    ///
    /// Creation hooks run after the object is registered and before this returns.
    pub fn get_or_create(&self, name: &str) -> Arc<SharedState> {
        let (state, created) = self.get_or_insert(name);
        if created {
            self.notify_created(&state);
        }
        state
    }

    /// Look up `name`, registering a new object if it is missing. Returns whether
    /// the object was created by this call.
    fn get_or_insert(&self, name: &str) -> (Arc<SharedState>, bool) {
        let mut objects = self.inner.objects.write().unwrap();
        if let Some(state) = objects.get(name) {
            return (state.clone(), false);
        }

        let state = Arc::new(SharedState::with_echo(name, self.inner.config.echo));
        objects.insert(name.to_string(), state.clone());
        debug!(name = %name, "Created shared state");
        (state, true)
    }

    fn notify_created(&self, state: &SharedState) {
        let event = ObjectEvent {
            name: state.name().to_string(),
            created_at: state.created_at(),
        };
        // Failures are logged by the collection and do not undo the creation.
        let _ = self.hooks().object_created(&event);
    }

    /// Return the object registered under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<SharedState>> {
        self.inner
            .objects
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| {
                RegistryError::ObjectNotFound {
                    name: name.to_string(),
                }
                .into()
            })
    }

    /// Subscribe a live connection to `name` and return a snapshot of its data.
    ///
    /// The subscription and the snapshot are taken together, so every later write
    /// reaches the connection as an update.
    ///
    /// # Errors
    /// - [`RegistryError::UnknownConnection`] if the connection is not live
    /// - [`RegistryError::ObjectNotFound`] if the object is missing and
    ///   `create_if_missing` is false
    pub fn connect_to_object(
        &self,
        connection: &ConnectionId,
        name: &str,
        create_if_missing: bool,
    ) -> Result<Value> {
        Ok(self
            .connect_snapshot(connection, name, create_if_missing)?
            .data)
    }

    /// Like [`connect_to_object`](Self::connect_to_object), returning the versioned snapshot.
    pub fn connect_snapshot(
        &self,
        connection: &ConnectionId,
        name: &str,
        create_if_missing: bool,
    ) -> Result<Snapshot> {
        self.live_connection(connection)?;
        loop {
            if create_if_missing {
                let (state, created) = self.get_or_insert(name);
                if created {
                    self.notify_created(&state);
                }
            }

            // Departures and collection take the write lock, so neither can run
            // between the lookups below and the attach.
            let objects = self.inner.objects.read().unwrap();
            let handle = self.live_connection(connection)?;
            match objects.get(name) {
                Some(state) => return state.attach(handle),
                // Collected since the lookup above; register it again.
                None if create_if_missing => continue,
                None => {
                    return Err(RegistryError::ObjectNotFound {
                        name: name.to_string(),
                    }
                    .into());
                }
            }
        }
    }

    /// Write `value` at `path` in `name` on behalf of a live connection.
    ///
    /// The connection is recorded as the origin of the broadcast. Returns the
    /// post-write root.
    pub fn write(
        &self,
        connection: &ConnectionId,
        name: &str,
        path: impl AsRef<Path>,
        value: Value,
    ) -> Result<Value> {
        Ok(self.write_snapshot(connection, name, path, value)?.data)
    }

    /// Like [`write`](Self::write), returning the versioned post-write snapshot.
    pub fn write_snapshot(
        &self,
        connection: &ConnectionId,
        name: &str,
        path: impl AsRef<Path>,
        value: Value,
    ) -> Result<Snapshot> {
        if !self.is_connected(connection) {
            return Err(RegistryError::UnknownConnection {
                connection: connection.to_string(),
            }
            .into());
        }
        let state = self.get(name)?;
        state.commit(path, value, Some(connection))
    }

    /// Collect every object that has no subscribers. Returns the collected names.
    pub fn collect_idle(&self) -> Vec<String> {
        let mut collected = Vec::new();
        let mut names = Vec::new();
        {
            let mut objects = self.inner.objects.write().unwrap();
            objects.retain(|name, state| {
                if state.collect_if_idle() {
                    names.push(name.clone());
                    collected.push(state.clone());
                    false
                } else {
                    true
                }
            });
        }
        if !names.is_empty() {
            info!(count = names.len(), "Collected idle objects");
        }
        self.notify_collected(&collected);
        names
    }

    fn notify_collected(&self, collected: &[Arc<SharedState>]) {
        if collected.is_empty() {
            return;
        }
        let hooks = self.hooks();
        for state in collected {
            debug!(name = %state.name(), "Collected shared state");
            let event = ObjectEvent {
                name: state.name().to_string(),
                created_at: state.created_at(),
            };
            let _ = hooks.object_collected(&event);
        }
    }

    fn hooks(&self) -> RegistryHookCollection {
        self.inner.hooks.read().unwrap().clone()
    }

    fn live_connection(&self, connection: &ConnectionId) -> Result<Arc<dyn Connection>> {
        self.inner
            .connections
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id() == connection)
            .cloned()
            .ok_or_else(|| {
                RegistryError::UnknownConnection {
                    connection: connection.to_string(),
                }
                .into()
            })
    }

    /// Names of every registered object, sorted.
    pub fn object_names(&self) -> Vec<String> {
        self.inner.objects.read().unwrap().keys().cloned().collect()
    }

    /// Number of registered objects.
    pub fn object_count(&self) -> usize {
        self.inner.objects.read().unwrap().len()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.inner.connections.lock().unwrap().len()
    }

    /// Ids of live connections in arrival order.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.inner
            .connections
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.id().clone())
            .collect()
    }

    /// Check whether a connection is live.
    pub fn is_connected(&self, connection: &ConnectionId) -> bool {
        self.inner
            .connections
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.id() == connection)
    }

    /// Status of every registered object, sorted by name.
    pub fn status(&self) -> Vec<ObjectStatus> {
        self.inner
            .objects
            .read()
            .unwrap()
            .values()
            .map(|state| ObjectStatus {
                name: state.name().to_string(),
                subscribers: state.subscriber_count(),
                created_at: state.created_at(),
            })
            .collect()
    }
}

/// Request handling scoped to one live connection.
///
/// Dropping a scope without calling [`depart`](Self::depart) departs the
/// connection, so a transport task that ends early still cleans up.
pub struct ConnectionScope {
    registry: Registry,
    connection: Arc<dyn Connection>,
    departed: bool,
}

impl ConnectionScope {
    /// The connection this scope serves.
    pub fn connection_id(&self) -> &ConnectionId {
        self.connection.id()
    }

    /// The registry this scope belongs to.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Handle one request from this connection.
    pub fn handle(&self, request: &Request) -> Response {
        let id = self.connection.id();
        let result = match request {
            Request::Connect {
                name,
                create_if_missing,
            } => self
                .registry
                .connect_snapshot(id, name, *create_if_missing),
            Request::Write { name, path, value } => {
                let path = path.as_deref().unwrap_or(Path::root());
                self.registry.write_snapshot(id, name, path, value.clone())
            }
        };

        if let Err(e) = &result {
            debug!(
                connection = %id,
                request = request.kind(),
                name = %request.name(),
                error = %e,
                "Request failed"
            );
        }
        Response::from(result)
    }

    /// Report this connection's departure.
    pub fn depart(mut self) -> DepartureReport {
        self.departed = true;
        self.registry.on_connection_depart(self.connection.id())
    }
}

impl Drop for ConnectionScope {
    fn drop(&mut self) {
        if !self.departed {
            self.registry.on_connection_depart(self.connection.id());
        }
    }
}
