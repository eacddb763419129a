//! Protocol definitions for shared state communication.
//!
//! This module defines transport-agnostic message types. Requests flow from a
//! client to the server and are answered by exactly one [`Response`]; updates flow
//! from the server to subscribers and are never answered.
//!
//! Stream transports wrap these in [`ClientFrame`] and [`ServerFrame`] so that
//! responses can be matched to requests while updates are interleaved.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    Error,
    path::{Path, PathBuf, PathError},
    registry::RegistryError,
    transport::{ConnectionId, TransportError},
};

/// Request messages a client can send to the server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Request {
    /// Subscribe to a named object and receive its current data.
    Connect {
        name: String,
        #[serde(default)]
        create_if_missing: bool,
    },
    /// Write a value into a named object. A missing or empty path replaces the root.
    Write {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
        value: Value,
    },
}

impl Request {
    /// Build a connect request.
    pub fn connect(name: impl Into<String>, create_if_missing: bool) -> Self {
        Request::Connect {
            name: name.into(),
            create_if_missing,
        }
    }

    /// Build a write request for a sub-path.
    pub fn write(name: impl Into<String>, path: impl AsRef<Path>, value: Value) -> Self {
        let path = path.as_ref();
        Request::Write {
            name: name.into(),
            path: (!path.is_root()).then(|| path.to_path_buf()),
            value,
        }
    }

    /// Build a write request replacing the whole tree.
    pub fn replace(name: impl Into<String>, value: Value) -> Self {
        Request::Write {
            name: name.into(),
            path: None,
            value,
        }
    }

    /// The object name this request targets.
    pub fn name(&self) -> &str {
        match self {
            Request::Connect { name, .. } | Request::Write { name, .. } => name,
        }
    }

    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Connect { .. } => "connect",
            Request::Write { .. } => "write",
        }
    }
}

/// The data of one object at one version.
///
/// Versions start at 0 for a new object and increase by one with every successful
/// write, so a client can tell which of two snapshots of the same object is newer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub data: Value,
    #[serde(default)]
    pub version: u64,
}

impl Snapshot {
    pub fn new(data: Value, version: u64) -> Self {
        Self { data, version }
    }
}

/// Response to a single [`Request`].
///
/// Serialises as `{"data": ..., "version": n}` or `{"error": {...}}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Response {
    /// The request failed; nothing was changed.
    Error { error: ErrorPayload },
    /// Snapshot of the object's data (after the write, for write requests).
    Data(Snapshot),
}

impl Response {
    /// Build a successful response.
    pub fn data(data: Value, version: u64) -> Self {
        Response::Data(Snapshot::new(data, version))
    }

    /// Convert into a result, reconstructing typed errors.
    pub fn into_result(self) -> crate::Result<Snapshot> {
        match self {
            Response::Data(snapshot) => Ok(snapshot),
            Response::Error { error } => Err(error.into_error()),
        }
    }
}

impl From<crate::Result<Snapshot>> for Response {
    fn from(result: crate::Result<Snapshot>) -> Self {
        match result {
            Ok(snapshot) => Response::Data(snapshot),
            Err(e) => Response::Error {
                error: ErrorPayload::from(&e),
            },
        }
    }
}

/// Classification of an error carried on the wire.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidPath,
    PathNotFound,
    ObjectNotFound,
    ObjectCollected,
    UnknownConnection,
    Internal,
}

/// Structured error: kind, display message, and the offending path or name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl ErrorPayload {
    /// Rebuild the typed error this payload was produced from.
    pub fn into_error(self) -> Error {
        let subject = self.subject.clone().unwrap_or_default();
        match self.kind {
            ErrorKind::InvalidPath => PathError::InvalidPath { path: subject }.into(),
            ErrorKind::PathNotFound => PathError::NotFound { path: subject }.into(),
            ErrorKind::ObjectNotFound => RegistryError::ObjectNotFound { name: subject }.into(),
            ErrorKind::ObjectCollected => RegistryError::ObjectCollected { name: subject }.into(),
            ErrorKind::UnknownConnection | ErrorKind::Internal => TransportError::Remote {
                kind: self.kind,
                message: self.message,
            }
            .into(),
        }
    }
}

impl From<&Error> for ErrorPayload {
    fn from(err: &Error) -> Self {
        let kind = match err {
            Error::Path(PathError::NotFound { .. }) => ErrorKind::PathNotFound,
            Error::Path(_) => ErrorKind::InvalidPath,
            Error::Registry(RegistryError::ObjectNotFound { .. }) => ErrorKind::ObjectNotFound,
            Error::Registry(RegistryError::ObjectCollected { .. }) => ErrorKind::ObjectCollected,
            Error::Registry(RegistryError::UnknownConnection { .. }) => {
                ErrorKind::UnknownConnection
            }
            _ => ErrorKind::Internal,
        };
        ErrorPayload {
            kind,
            message: err.to_string(),
            subject: err.subject().map(str::to_string),
        }
    }
}

/// Server-to-subscriber notification that a named object changed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UpdateNotification {
    /// Name of the object that changed.
    pub name: String,
    /// Path that was written; `None` when the root was replaced.
    pub changed_path: Option<PathBuf>,
    /// The object's full data after the write.
    pub data: Value,
    /// Connection that made the write, when it came from a connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<ConnectionId>,
    /// Version of `data`; see [`Snapshot`].
    #[serde(default)]
    pub version: u64,
}

/// A request tagged with a client-chosen id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClientFrame {
    pub id: u64,
    pub request: Request,
}

/// Everything a server sends down a connection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Answer to the [`ClientFrame`] with the same id.
    Response { id: u64, response: Response },
    /// Broadcast for an object this connection subscribes to.
    Update(UpdateNotification),
}
