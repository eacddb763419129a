//! Error types for the mirror module.

use thiserror::Error;

/// Errors that can occur when using a client mirror.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The mirror has no transport, or its transport has closed.
    #[error("Mirror '{name}' is not connected")]
    NotConnected {
        /// Name of the mirrored object
        name: String,
    },

    /// `connect` was called on a mirror that is already connected.
    #[error("Mirror '{name}' is already connected")]
    AlreadyConnected {
        /// Name of the mirrored object
        name: String,
    },
}

impl MirrorError {
    /// Check if this error means the mirror needs to connect first.
    pub fn is_not_connected(&self) -> bool {
        matches!(self, MirrorError::NotConnected { .. })
    }

    /// Get the mirrored object's name.
    pub fn name(&self) -> &str {
        match self {
            MirrorError::NotConnected { name } | MirrorError::AlreadyConnected { name } => name,
        }
    }
}

impl From<MirrorError> for crate::Error {
    fn from(err: MirrorError) -> Self {
        crate::Error::Mirror(err)
    }
}
