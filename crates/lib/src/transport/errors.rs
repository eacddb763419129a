//! Error types for the transport module.

use thiserror::Error;

use crate::protocol::ErrorKind;

/// Errors that can occur while moving messages between clients and the server.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The connection is closed; no further messages can be exchanged.
    #[error("Connection closed")]
    Closed,

    /// An update could not be delivered to one subscriber.
    #[error("Failed to deliver update to {connection}: {reason}")]
    DeliveryFailed { connection: String, reason: String },

    /// Client connection error.
    #[error("Failed to connect to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    /// Attempted to start a server when one is already running.
    #[error("Server already running on {address}")]
    ServerAlreadyRunning { address: String },

    /// Attempted to stop a server when none is running.
    #[error("Server not running")]
    ServerNotRunning,

    /// Server bind error.
    #[error("Failed to bind server to {address}: {reason}")]
    ServerBind { address: String, reason: String },

    /// A frame could not be encoded or decoded.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// A frame exceeded the size limit.
    #[error("Frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },

    /// The server answered with an error that has no local counterpart.
    #[error("{message}")]
    Remote { kind: ErrorKind, message: String },
}

impl TransportError {
    /// Check if this error means the connection is gone.
    pub fn is_closed(&self) -> bool {
        matches!(self, TransportError::Closed)
    }

    /// Check if this is a per-subscriber delivery failure.
    pub fn is_delivery_failure(&self) -> bool {
        matches!(self, TransportError::DeliveryFailed { .. })
    }

    /// Check if this is a server lifecycle error.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            TransportError::ServerAlreadyRunning { .. }
                | TransportError::ServerNotRunning
                | TransportError::ServerBind { .. }
        )
    }

    /// Check if this is a framing error.
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            TransportError::InvalidFrame(_) | TransportError::FrameTooLarge { .. }
        )
    }
}

impl From<TransportError> for crate::Error {
    fn from(err: TransportError) -> Self {
        crate::Error::Transport(err)
    }
}
