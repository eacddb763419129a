//! Path types and path-based access into nested values.
//!
//! A path names a location inside a shared state's data tree as a sequence of
//! mapping keys joined by `.`. The empty path names the root itself. Segments are
//! always mapping keys: they are never normalised and never parsed as sequence indices.
//!
//! [`Path`] and [`PathBuf`] follow the same borrowed/owned pattern as
//! `std::path::Path`/`PathBuf`.
//!
//! ```rust
//! use serde_json::json;
//! use sharedstate::path::{self, Path};
//!
//! let mut data = json!({ "foo": {} });
//! path::write(&mut data, Path::new("foo.bar.baz"), json!("w00t!"), true)?;
//! assert_eq!(path::read(&data, Path::new("foo.bar.baz"))?, &json!("w00t!"));
//! # Ok::<(), sharedstate::path::PathError>(())
//! ```

use std::{borrow::Borrow, fmt, ops::Deref};

use serde::{Deserialize, Serialize};

use crate::constants::PATH_DELIMITER;

mod accessor;
mod errors;

pub use accessor::{read, write};
pub use errors::PathError;

/// A borrowed path into a nested value.
///
/// This type is unsized and must always be used behind a reference.
#[derive(Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Path {
    inner: str,
}

/// An owned path into a nested value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathBuf {
    inner: String,
}

impl Path {
    /// Wraps a string as a path. Every string is a valid path.
    pub fn new<S: AsRef<str> + ?Sized>(s: &S) -> &Path {
        let s: &str = s.as_ref();
        // SAFETY: Path is a repr(transparent) wrapper around str
        unsafe { &*(s as *const str as *const Path) }
    }

    /// The root path.
    pub fn root() -> &'static Path {
        Path::new("")
    }

    /// Returns `true` if this path names the root of the tree.
    pub fn is_root(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns an iterator over the path segments, in order.
    ///
    /// The root path has no segments. Empty segments between consecutive
    /// delimiters are kept as empty keys.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        let inner = if self.is_root() { None } else { Some(&self.inner) };
        inner
            .into_iter()
            .flat_map(|inner| inner.split(PATH_DELIMITER))
    }

    /// Returns the number of segments in the path.
    pub fn len(&self) -> usize {
        self.segments().count()
    }

    /// Returns `true` if the path has no segments.
    pub fn is_empty(&self) -> bool {
        self.is_root()
    }

    /// Splits off the final segment, returning the parent path and that segment.
    ///
    /// Returns `None` for the root path.
    pub fn split_last(&self) -> Option<(&Path, &str)> {
        if self.is_root() {
            return None;
        }
        match self.inner.rfind(PATH_DELIMITER) {
            Some(idx) => Some((Path::new(&self.inner[..idx]), &self.inner[idx + 1..])),
            None => Some((Path::root(), &self.inner)),
        }
    }

    /// Returns the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Converts this `Path` to an owned `PathBuf`.
    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf {
            inner: self.inner.to_string(),
        }
    }
}

impl PathBuf {
    /// Creates the root path.
    pub fn new() -> Self {
        Self {
            inner: String::new(),
        }
    }

    /// Builds a path from pre-split segments.
    ///
    /// # Errors
    /// Returns [`PathError::InvalidSegment`] if a segment contains the delimiter,
    /// since it could not be told apart from two segments afterwards.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut path = PathBuf::new();
        let mut first = true;
        for segment in segments {
            let segment = segment.as_ref();
            if segment.contains(PATH_DELIMITER) {
                return Err(PathError::InvalidSegment {
                    segment: segment.to_string(),
                });
            }
            if !first {
                path.inner.push(PATH_DELIMITER);
            }
            path.inner.push_str(segment);
            first = false;
        }
        Ok(path)
    }

    /// Appends a single segment.
    pub fn push(mut self, segment: impl AsRef<str>) -> Self {
        if !self.inner.is_empty() {
            self.inner.push(PATH_DELIMITER);
        }
        self.inner.push_str(segment.as_ref());
        self
    }

    /// Consumes the path, returning the underlying string.
    pub fn into_string(self) -> String {
        self.inner
    }
}

impl Deref for PathBuf {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        Path::new(self.inner.as_str())
    }
}

impl AsRef<Path> for PathBuf {
    fn as_ref(&self) -> &Path {
        self
    }
}

impl AsRef<Path> for Path {
    fn as_ref(&self) -> &Path {
        self
    }
}

impl AsRef<Path> for str {
    fn as_ref(&self) -> &Path {
        Path::new(self)
    }
}

impl AsRef<Path> for String {
    fn as_ref(&self) -> &Path {
        Path::new(self.as_str())
    }
}

impl AsRef<str> for Path {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}

impl AsRef<str> for PathBuf {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}

impl Borrow<Path> for PathBuf {
    fn borrow(&self) -> &Path {
        self
    }
}

impl ToOwned for Path {
    type Owned = PathBuf;

    fn to_owned(&self) -> PathBuf {
        self.to_path_buf()
    }
}

impl From<&str> for PathBuf {
    fn from(s: &str) -> Self {
        Self {
            inner: s.to_string(),
        }
    }
}

impl From<String> for PathBuf {
    fn from(inner: String) -> Self {
        Self { inner }
    }
}

impl From<&Path> for PathBuf {
    fn from(path: &Path) -> Self {
        path.to_path_buf()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

impl fmt::Display for PathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}
