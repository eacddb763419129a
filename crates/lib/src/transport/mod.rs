//! Transport abstractions for shared state communication.
//!
//! The server side sees each client as a [`Connection`]: an identity plus a
//! non-blocking way to push updates. The client side talks to the server through a
//! [`ClientTransport`]: request/response plus a stream of pushed updates.
//!
//! Implementations must deliver messages in order per connection and report a
//! departure to the [`Registry`](crate::Registry) exactly once when a connection
//! closes, whether it closed cleanly or not.

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    Result,
    path::Path,
    protocol::{Request, Response, Snapshot, UpdateNotification},
};

mod errors;
pub mod memory;
pub mod shared;
#[cfg(feature = "tcp")]
pub mod tcp;

pub use errors::TransportError;

/// Identity of one connection, unique for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh connection id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Server-side handle for one connected client.
///
/// Subscribers of a shared state are connections. Sending must not block: it is
/// called while the shared state is locked, once per subscriber per write.
pub trait Connection: Send + Sync {
    /// The identity of this connection.
    fn id(&self) -> &ConnectionId;

    /// Queue an update for delivery to this connection.
    ///
    /// # Errors
    /// Returns [`TransportError::DeliveryFailed`] if the update cannot be queued.
    /// The caller logs the failure and carries on with the remaining subscribers.
    fn send_update(&self, update: &UpdateNotification) -> Result<()>;
}

/// Client-side view of a connection to the server.
#[async_trait]
pub trait ClientTransport: Send + Sync {
    /// Get the transport type identifier (e.g. "memory", "tcp").
    fn transport_type(&self) -> &'static str;

    /// Send a request and wait for its response.
    ///
    /// There is no timeout; callers that need one wrap this future.
    async fn request(&self, request: Request) -> Result<Response>;

    /// Receive every update pushed down this connection from now on.
    fn subscribe_updates(&self) -> broadcast::Receiver<UpdateNotification>;

    /// Check whether the connection has closed.
    fn is_closed(&self) -> bool;

    /// Subscribe to a named object and return its current versioned data.
    async fn connect_snapshot(&self, name: &str, create_if_missing: bool) -> Result<Snapshot> {
        self.request(Request::connect(name, create_if_missing))
            .await?
            .into_result()
    }

    /// Write into a named object and return the server's post-write snapshot.
    async fn write_snapshot(&self, name: &str, path: &Path, value: Value) -> Result<Snapshot> {
        self.request(Request::write(name, path, value))
            .await?
            .into_result()
    }

    /// Subscribe to a named object and return its current data.
    async fn connect_object(&self, name: &str, create_if_missing: bool) -> Result<Value> {
        Ok(self.connect_snapshot(name, create_if_missing).await?.data)
    }

    /// Write into a named object and return the server's post-write data.
    async fn write_object(&self, name: &str, path: &Path, value: Value) -> Result<Value> {
        Ok(self.write_snapshot(name, path, value).await?.data)
    }
}
