//! Client-side mirror of one shared state.
//!
//! A [`Mirror`] caches the server's data for one named object. Local data only ever
//! changes to something the server sent: the snapshot returned on connect, the
//! post-write root acknowledging a [`set`](Mirror::set), or an update pushed after
//! any subscriber's write. Writes are never applied optimistically, so a rejected
//! write leaves the mirror untouched.
//!
//! Every snapshot the server sends carries the object's version. An acknowledgement
//! or update older than the data already held is ignored, so responses and updates
//! racing on different tasks cannot roll the mirror back.
//!
//! Listeners are registered per event name and fire in registration order:
//!
//! - `sync` when the initial snapshot is installed
//! - `change` for every pushed update
//!
//! ```rust,no_run
//! # async fn example(registry: sharedstate::Registry) -> sharedstate::Result<()> {
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use sharedstate::{Mirror, constants::CHANGE_EVENT, transport::memory::MemoryTransport};
//!
//! let mirror = Mirror::new("/foo");
//! mirror.on(CHANGE_EVENT, |event| println!("{:?} changed", event.changed_path));
//! mirror.connect(Arc::new(MemoryTransport::connect(&registry))).await?;
//! mirror.set("person.name", json!("Ada")).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex, RwLock};

use serde_json::{Map, Value};
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};
use tracing::{debug, warn};

use crate::{
    Result,
    constants::{CHANGE_EVENT, SYNC_EVENT},
    path::{self, Path},
    protocol::{Snapshot, UpdateNotification},
    transport::ClientTransport,
};

mod errors;
mod listeners;

pub use errors::MirrorError;
pub use listeners::{ChangeEvent, Listener, ListenerId, Listeners};

struct MirrorInner {
    name: String,
    replica: RwLock<Snapshot>,
    listeners: Mutex<Listeners>,
}

impl MirrorInner {
    fn install(&self, snapshot: Snapshot) {
        *self.replica.write().unwrap() = snapshot;
    }

    /// Install `data` unless the replica already holds version `version` or later
    /// (`or_equal` also accepts an equal version). Returns whether it was installed.
    fn install_if_newer(&self, data: &Value, version: u64, or_equal: bool) -> bool {
        let mut replica = self.replica.write().unwrap();
        if version < replica.version || (version == replica.version && !or_equal) {
            return false;
        }
        *replica = Snapshot::new(data.clone(), version);
        true
    }

    fn apply_update(&self, update: UpdateNotification) {
        // Updates arrive in version order, so an equal version is this mirror's own
        // acknowledged write being echoed and still counts as a change.
        if !self.install_if_newer(&update.data, update.version, true) {
            debug!(
                name = %self.name,
                version = update.version,
                "Ignoring stale update"
            );
            return;
        }
        debug!(
            name = %self.name,
            path = ?update.changed_path,
            version = update.version,
            "Applied update"
        );
        self.emit(
            CHANGE_EVENT,
            &ChangeEvent {
                name: update.name,
                changed_path: update.changed_path,
                data: update.data,
            },
        );
    }

    fn emit(&self, event: &str, payload: &ChangeEvent) {
        // Listeners run outside the lock so they may register or remove listeners.
        let listeners = self.listeners.lock().unwrap().snapshot(event);
        for listener in listeners {
            listener(payload);
        }
    }
}

/// Cached replica of one named shared state.
pub struct Mirror {
    inner: Arc<MirrorInner>,
    transport: Mutex<Option<Arc<dyn ClientTransport>>>,
    updates_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Mirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mirror")
            .field("name", &self.inner.name)
            .field("replica", &*self.inner.replica.read().unwrap())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Mirror {
    /// Create a disconnected mirror of `name` holding an empty mapping.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(MirrorInner {
                name: name.into(),
                replica: RwLock::new(Snapshot::new(Value::Object(Map::new()), 0)),
                listeners: Mutex::new(Listeners::new()),
            }),
            transport: Mutex::new(None),
            updates_task: Mutex::new(None),
        }
    }

    /// Name of the mirrored object.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Connect through `transport`, creating the object on the server if needed.
    ///
    /// Resolves once the initial snapshot is installed, and returns it.
    pub async fn connect(&self, transport: Arc<dyn ClientTransport>) -> Result<Value> {
        self.connect_with(transport, true).await
    }

    /// Connect through `transport`.
    ///
    /// # Errors
    /// - [`MirrorError::AlreadyConnected`] if this mirror already has a transport
    /// - `ObjectNotFound` from the server when the object is missing and
    ///   `create_if_missing` is false
    /// - transport errors if the connection fails before the snapshot arrives
    pub async fn connect_with(
        &self,
        transport: Arc<dyn ClientTransport>,
        create_if_missing: bool,
    ) -> Result<Value> {
        if self.transport.lock().unwrap().is_some() {
            return Err(MirrorError::AlreadyConnected {
                name: self.inner.name.clone(),
            }
            .into());
        }

        // Subscribe first so no update sent after the snapshot can be missed.
        let mut updates = transport.subscribe_updates();
        let snapshot = transport
            .connect_snapshot(&self.inner.name, create_if_missing)
            .await?;
        let data = snapshot.data.clone();

        {
            let mut slot = self.transport.lock().unwrap();
            if slot.is_some() {
                return Err(MirrorError::AlreadyConnected {
                    name: self.inner.name.clone(),
                }
                .into());
            }
            *slot = Some(transport.clone());
        }
        debug!(
            name = %self.inner.name,
            transport = transport.transport_type(),
            version = snapshot.version,
            "Mirror synchronised"
        );
        self.inner.install(snapshot);
        self.inner.emit(
            SYNC_EVENT,
            &ChangeEvent {
                name: self.inner.name.clone(),
                changed_path: None,
                data: data.clone(),
            },
        );

        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(update) if update.name == inner.name => inner.apply_update(update),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(name = %inner.name, skipped, "Mirror fell behind; skipped updates");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!(name = %inner.name, "Mirror update stream ended");
        });
        if let Some(previous) = self.updates_task.lock().unwrap().replace(task) {
            previous.abort();
        }
        Ok(data)
    }

    /// Write `value` at `path` on the server.
    ///
    /// On success local data is replaced with the server's post-write root, which
    /// is also returned, unless a newer update has already been applied. On failure
    /// local data is unchanged.
    pub async fn set(&self, path: impl AsRef<Path>, value: Value) -> Result<Value> {
        let transport = self.transport()?;
        let snapshot = transport
            .write_snapshot(&self.inner.name, path.as_ref(), value)
            .await?;
        if !self.inner.install_if_newer(&snapshot.data, snapshot.version, false) {
            debug!(
                name = %self.inner.name,
                version = snapshot.version,
                "Acknowledgement already superseded by an update"
            );
        }
        Ok(snapshot.data)
    }

    /// Replace the whole object on the server.
    pub async fn replace(&self, value: Value) -> Result<Value> {
        self.set(Path::root(), value).await
    }

    /// Snapshot of the local data.
    pub fn data(&self) -> Value {
        self.inner.replica.read().unwrap().data.clone()
    }

    /// Version of the local data, as assigned by the server.
    pub fn version(&self) -> u64 {
        self.inner.replica.read().unwrap().version
    }

    /// Read the local value at `path`.
    pub fn get(&self, path: impl AsRef<Path>) -> Result<Value> {
        let replica = self.inner.replica.read().unwrap();
        Ok(path::read(&replica.data, path)?.clone())
    }

    /// Check whether the mirror has a transport that is still open.
    pub fn is_connected(&self) -> bool {
        self.transport
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|t| !t.is_closed())
    }

    /// Stop following updates and release the transport. Local data is kept.
    ///
    /// Returns whether the mirror was connected.
    pub fn disconnect(&self) -> bool {
        if let Some(task) = self.updates_task.lock().unwrap().take() {
            task.abort();
        }
        self.transport.lock().unwrap().take().is_some()
    }

    /// Register a listener for `event`.
    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.inner
            .listeners
            .lock()
            .unwrap()
            .add(event, Arc::new(listener))
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn remove_listener(&self, event: &str, id: ListenerId) -> bool {
        self.inner.listeners.lock().unwrap().remove(event, id)
    }

    /// Remove every listener for `event`, or for every event when `None`.
    pub fn remove_all_listeners(&self, event: Option<&str>) {
        self.inner.listeners.lock().unwrap().remove_all(event);
    }

    /// Number of listeners registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.listeners.lock().unwrap().count(event)
    }

    fn transport(&self) -> Result<Arc<dyn ClientTransport>> {
        self.transport
            .lock()
            .unwrap()
            .clone()
            .filter(|t| !t.is_closed())
            .ok_or_else(|| {
                MirrorError::NotConnected {
                    name: self.inner.name.clone(),
                }
                .into()
            })
    }
}

impl Drop for Mirror {
    fn drop(&mut self) {
        if let Some(task) = self.updates_task.lock().unwrap().take() {
            task.abort();
        }
    }
}
