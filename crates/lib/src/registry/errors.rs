//! Registry error types.
//!
//! This module defines structured error types for object lookup, connection
//! tracking and object lifecycle.

use thiserror::Error;

/// Errors that can occur during registry operations.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No object is registered under the name and creation was not requested.
    #[error("No such object: '{name}'")]
    ObjectNotFound {
        /// The requested object name
        name: String,
    },

    /// The object was collected after its last subscriber departed.
    #[error("Object has been collected: '{name}'")]
    ObjectCollected {
        /// The name the object was registered under
        name: String,
    },

    /// The connection is not in the live set.
    #[error("Unknown connection: {connection}")]
    UnknownConnection {
        /// Display form of the connection id
        connection: String,
    },

    /// A registry hook reported a failure.
    #[error("Registry hook failed for '{name}': {reason}")]
    HookFailed {
        /// The object the hook was called for
        name: String,
        /// Description of the failure
        reason: String,
    },
}

impl RegistryError {
    /// Check if this error means the named object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::ObjectNotFound { .. })
    }

    /// Check if this error refers to a collected object.
    pub fn is_collected(&self) -> bool {
        matches!(self, RegistryError::ObjectCollected { .. })
    }

    /// Check if this error is about an unknown connection.
    pub fn is_unknown_connection(&self) -> bool {
        matches!(self, RegistryError::UnknownConnection { .. })
    }

    /// Get the object name associated with this error, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            RegistryError::ObjectNotFound { name }
            | RegistryError::ObjectCollected { name }
            | RegistryError::HookFailed { name, .. } => Some(name),
            RegistryError::UnknownConnection { .. } => None,
        }
    }
}

impl From<RegistryError> for crate::Error {
    fn from(err: RegistryError) -> Self {
        crate::Error::Registry(err)
    }
}
