//! Named, path-addressable shared state and its subscribers.
//!
//! A [`SharedState`] owns one data tree and the ordered set of connections that
//! watch it. Every successful write is broadcast to every subscriber in subscribe
//! order before the write returns; a failed write changes nothing and notifies
//! nobody.
//!
//! Data, subscribers and lifecycle sit behind a single lock, so a write together
//! with its broadcast is atomic with respect to reads, subscribes and unsubscribes.
//! Once [`unsubscribe`](SharedState::unsubscribe) returns, the removed connection
//! receives nothing further from this state.
//!
//! Every successful write bumps the state's version. Snapshots and updates carry it,
//! so replicas can discard anything older than what they already hold.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    Result,
    config::EchoPolicy,
    constants::DEFAULT_OBJECT_NAME,
    path::{self, Path},
    protocol::{Snapshot, UpdateNotification},
    registry::RegistryError,
    transport::{Connection, ConnectionId},
};

/// Where a shared state is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Data initialised, no subscribers yet.
    Created,
    /// At least one subscriber; writes are broadcast.
    Active,
    /// Removed from its registry. Terminal: every operation fails.
    Collected,
}

/// Outcome of broadcasting one update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers the update was queued for.
    pub delivered: usize,
    /// Subscribers passed over by the echo policy.
    pub skipped: usize,
    /// Subscribers whose delivery failed.
    pub failed: Vec<ConnectionId>,
}

struct StateInner {
    data: Value,
    version: u64,
    subscribers: Vec<Arc<dyn Connection>>,
    collected: bool,
}

/// One named data tree plus the connections subscribed to it.
pub struct SharedState {
    name: String,
    echo: EchoPolicy,
    created_at: DateTime<Utc>,
    inner: Mutex<StateInner>,
}

impl std::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("SharedState")
            .field("name", &self.name)
            .field("echo", &self.echo)
            .field("data", &inner.data)
            .field("version", &inner.version)
            .field("subscribers", &inner.subscribers.len())
            .field("collected", &inner.collected)
            .finish()
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(DEFAULT_OBJECT_NAME)
    }
}

impl SharedState {
    /// Create an empty shared state that echoes writes to their origin.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_echo(name, EchoPolicy::default())
    }

    /// Create an empty shared state with the given echo policy.
    pub fn with_echo(name: impl Into<String>, echo: EchoPolicy) -> Self {
        Self {
            name: name.into(),
            echo,
            created_at: Utc::now(),
            inner: Mutex::new(StateInner {
                data: Value::Object(Map::new()),
                version: 0,
                subscribers: Vec::new(),
                collected: false,
            }),
        }
    }

    /// The name this state is registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The echo policy applied to broadcasts.
    pub fn echo(&self) -> EchoPolicy {
        self.echo
    }

    /// When this state was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Current lifecycle stage.
    pub fn lifecycle(&self) -> Lifecycle {
        let inner = self.inner.lock().unwrap();
        if inner.collected {
            Lifecycle::Collected
        } else if inner.subscribers.is_empty() {
            Lifecycle::Created
        } else {
            Lifecycle::Active
        }
    }

    /// Check whether this state has been collected.
    pub fn is_collected(&self) -> bool {
        self.inner.lock().unwrap().collected
    }

    /// Snapshot of the whole data tree.
    pub fn read_root(&self) -> Result<Value> {
        let inner = self.live()?;
        Ok(inner.data.clone())
    }

    /// Snapshot of the whole data tree together with its version.
    pub fn snapshot(&self) -> Result<Snapshot> {
        let inner = self.live()?;
        Ok(Snapshot::new(inner.data.clone(), inner.version))
    }

    /// Number of successful writes so far.
    pub fn version(&self) -> u64 {
        self.inner.lock().unwrap().version
    }

    /// Snapshot of the value at `path`.
    pub fn read_path(&self, path: impl AsRef<Path>) -> Result<Value> {
        let inner = self.live()?;
        Ok(path::read(&inner.data, path)?.clone())
    }

    /// Write `value` at `path`, creating missing intermediate mappings, then broadcast.
    ///
    /// `origin` is the connection that asked for the write, if any; it is carried on
    /// the update and consulted by the echo policy. Returns the post-write root.
    ///
    /// # Errors
    /// On a path error the data is untouched and no subscriber is notified.
    pub fn write_path(
        &self,
        path: impl AsRef<Path>,
        value: Value,
        origin: Option<&ConnectionId>,
    ) -> Result<Value> {
        Ok(self.commit(path, value, origin)?.data)
    }

    /// Like [`write_path`](Self::write_path), returning the post-write snapshot.
    pub fn commit(
        &self,
        path: impl AsRef<Path>,
        value: Value,
        origin: Option<&ConnectionId>,
    ) -> Result<Snapshot> {
        let path = path.as_ref();
        let mut inner = self.live()?;
        path::write(&mut inner.data, path, value, true)?;
        inner.version += 1;
        debug!(name = %self.name, path = %path, version = inner.version, "Wrote shared state");
        self.broadcast_locked(&inner, path, origin);
        Ok(Snapshot::new(inner.data.clone(), inner.version))
    }

    /// Replace the whole data tree, then broadcast.
    pub fn replace_root(&self, value: Value, origin: Option<&ConnectionId>) -> Result<Value> {
        self.write_path(Path::root(), value, origin)
    }

    /// Add a subscriber. Subscribing a connection that is already subscribed is a no-op.
    pub fn subscribe(&self, connection: Arc<dyn Connection>) -> Result<&Self> {
        let mut inner = self.live()?;
        Self::subscribe_locked(&mut inner, &self.name, connection);
        Ok(self)
    }

    /// Subscribe and take a snapshot in one step, so no write falls between them.
    pub(crate) fn attach(&self, connection: Arc<dyn Connection>) -> Result<Snapshot> {
        let mut inner = self.live()?;
        Self::subscribe_locked(&mut inner, &self.name, connection);
        Ok(Snapshot::new(inner.data.clone(), inner.version))
    }

    fn subscribe_locked(inner: &mut StateInner, name: &str, connection: Arc<dyn Connection>) {
        if inner
            .subscribers
            .iter()
            .any(|existing| existing.id() == connection.id())
        {
            return;
        }
        debug!(name = %name, connection = %connection.id(), "Subscribed");
        inner.subscribers.push(connection);
    }

    /// Remove every occurrence of a subscriber. Returns whether it was subscribed.
    pub fn unsubscribe(&self, connection: &ConnectionId) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|existing| existing.id() != connection);
        let removed = inner.subscribers.len() != before;
        if removed {
            debug!(name = %self.name, connection = %connection, "Unsubscribed");
        }
        removed
    }

    /// Number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().unwrap().subscribers.len()
    }

    /// Ids of current subscribers, in subscribe order.
    pub fn subscriber_ids(&self) -> Vec<ConnectionId> {
        self.inner
            .lock()
            .unwrap()
            .subscribers
            .iter()
            .map(|s| s.id().clone())
            .collect()
    }

    /// Check whether a connection is subscribed.
    pub fn is_subscribed(&self, connection: &ConnectionId) -> bool {
        self.inner
            .lock()
            .unwrap()
            .subscribers
            .iter()
            .any(|s| s.id() == connection)
    }

    /// Send the current data to every subscriber, tagged with `changed_path`.
    ///
    /// Writes broadcast on their own; this is for re-announcing state.
    pub fn broadcast(
        &self,
        changed_path: impl AsRef<Path>,
        origin: Option<&ConnectionId>,
    ) -> Result<BroadcastReport> {
        let inner = self.live()?;
        Ok(self.broadcast_locked(&inner, changed_path.as_ref(), origin))
    }

    fn broadcast_locked(
        &self,
        inner: &StateInner,
        changed_path: &Path,
        origin: Option<&ConnectionId>,
    ) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        if inner.subscribers.is_empty() {
            return report;
        }

        let update = UpdateNotification {
            name: self.name.clone(),
            changed_path: (!changed_path.is_root()).then(|| changed_path.to_path_buf()),
            data: inner.data.clone(),
            origin: origin.cloned(),
            version: inner.version,
        };

        for subscriber in &inner.subscribers {
            if !self.echo.delivers_to(subscriber.id(), origin) {
                report.skipped += 1;
                continue;
            }
            match subscriber.send_update(&update) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        name = %self.name,
                        connection = %subscriber.id(),
                        error = %e,
                        "Failed to deliver update"
                    );
                    report.failed.push(subscriber.id().clone());
                }
            }
        }
        report
    }

    /// Mark this state collected if it has no subscribers. Returns whether it was.
    pub(crate) fn collect_if_idle(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.collected || !inner.subscribers.is_empty() {
            return false;
        }
        inner.collected = true;
        true
    }

    fn live(&self) -> Result<MutexGuard<'_, StateInner>> {
        let inner = self.inner.lock().unwrap();
        if inner.collected {
            return Err(RegistryError::ObjectCollected {
                name: self.name.clone(),
            }
            .into());
        }
        Ok(inner)
    }
}
