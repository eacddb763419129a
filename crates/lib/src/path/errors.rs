//! Error types for path traversal.

use thiserror::Error;

/// Structured error types for reading and writing values by path.
///
/// Both traversal failures render as `Invalid property: '<path>'`, the message shape
/// existing clients match on. The variant carries the distinction between a path that
/// runs through a scalar and a path whose segment is simply absent.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    /// A segment traverses through a value that is not a mapping.
    ///
    /// Terminal: creating intermediate nodes cannot repair it.
    #[error("Invalid property: '{path}'")]
    InvalidPath { path: String },

    /// A segment is absent and intermediate creation was not requested.
    #[error("Invalid property: '{path}'")]
    NotFound { path: String },

    /// A pre-split segment contains the path delimiter.
    #[error("Invalid property segment '{segment}': segments cannot contain '.'")]
    InvalidSegment { segment: String },
}

impl PathError {
    pub(crate) fn invalid(path: impl Into<String>) -> Self {
        PathError::InvalidPath { path: path.into() }
    }

    pub(crate) fn not_found(path: impl Into<String>) -> Self {
        PathError::NotFound { path: path.into() }
    }

    /// Check if this error indicates a traversal through a non-container value.
    pub fn is_invalid_path(&self) -> bool {
        matches!(self, PathError::InvalidPath { .. })
    }

    /// Check if this error indicates an absent segment.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PathError::NotFound { .. })
    }

    /// The full offending path (or segment) this error refers to.
    pub fn path(&self) -> &str {
        match self {
            PathError::InvalidPath { path } | PathError::NotFound { path } => path,
            PathError::InvalidSegment { segment } => segment,
        }
    }
}

impl From<PathError> for crate::Error {
    fn from(err: PathError) -> Self {
        crate::Error::Path(err)
    }
}
