//!
//! sharedstate: server-authoritative shared state, replicated to subscribers by path.
//! This library provides the core components for hosting named state trees on a server
//! and mirroring them on connected clients.
//!
//! ## Core Concepts
//!
//! * **Paths (`path::Path`)**: Dot-delimited addresses into a nested JSON mapping, with
//!   read and write semantics that never partially apply.
//! * **Shared state (`state::SharedState`)**: One named data tree plus the ordered set of
//!   connections subscribed to it. Every successful write is broadcast to every subscriber.
//! * **Registry (`registry::Registry`)**: Maps names to shared states, scopes request handling
//!   to connections, and collects states whose last subscriber departs.
//! * **Mirror (`mirror::Mirror`)**: The client-side cached replica of one shared state, with
//!   named event listeners fired on every authoritative update.
//! * **Transports (`transport`)**: Connection handles and client transports. An in-process
//!   channel transport and a newline-delimited JSON transport over TCP are included.

pub mod config;
pub mod constants;
pub mod mirror;
pub mod path;
pub mod protocol;
pub mod registry;
pub mod state;
pub mod transport;

pub use mirror::Mirror;
pub use registry::Registry;
pub use state::SharedState;

/// Result type used throughout the sharedstate library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the sharedstate library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured path errors from the path module
    #[error(transparent)]
    Path(path::PathError),

    /// Structured registry errors from the registry module
    #[error(transparent)]
    Registry(registry::RegistryError),

    /// Structured client mirror errors from the mirror module
    #[error(transparent)]
    Mirror(mirror::MirrorError),

    /// Structured transport errors from the transport module
    #[error(transparent)]
    Transport(transport::TransportError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Path(_) => "path",
            Error::Registry(_) => "registry",
            Error::Mirror(_) => "mirror",
            Error::Transport(_) => "transport",
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error indicates a path segment or named object was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Path(path_err) => path_err.is_not_found(),
            Error::Registry(registry_err) => registry_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error indicates a path traversed through a non-container value.
    pub fn is_invalid_path(&self) -> bool {
        match self {
            Error::Path(path_err) => path_err.is_invalid_path(),
            _ => false,
        }
    }

    /// Check if this error is a path error of any kind.
    pub fn is_path_error(&self) -> bool {
        matches!(self, Error::Path(_))
    }

    /// Check if this error refers to a shared state that has already been collected.
    pub fn is_collected(&self) -> bool {
        match self {
            Error::Registry(registry_err) => registry_err.is_collected(),
            _ => false,
        }
    }

    /// Check if this error is transport-related.
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Io(_))
    }

    /// Check if this error is a failed delivery to a single subscriber.
    pub fn is_delivery_failure(&self) -> bool {
        match self {
            Error::Transport(transport_err) => transport_err.is_delivery_failure(),
            _ => false,
        }
    }

    /// Get the offending path or object name, if this error carries one.
    pub fn subject(&self) -> Option<&str> {
        match self {
            Error::Path(path_err) => Some(path_err.path()),
            Error::Registry(registry_err) => registry_err.name(),
            _ => None,
        }
    }
}
