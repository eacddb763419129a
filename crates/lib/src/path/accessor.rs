//! Reading and writing values at a path inside a nested mapping.

use serde_json::{Map, Value};

use super::{Path, PathError};

/// Read the value at `path` inside `root`.
///
/// The root path always succeeds and returns `root` itself. Traversal stops at the
/// first failing segment: a segment under a non-mapping value is
/// [`PathError::InvalidPath`], an absent key is [`PathError::NotFound`]. Both errors
/// name the full original path.
pub fn read<'a>(root: &'a Value, path: impl AsRef<Path>) -> Result<&'a Value, PathError> {
    let path = path.as_ref();
    let mut current = root;
    for segment in path.segments() {
        current = match current {
            Value::Object(map) => map
                .get(segment)
                .ok_or_else(|| PathError::not_found(path.as_str()))?,
            _ => return Err(PathError::invalid(path.as_str())),
        };
    }
    Ok(current)
}

/// Write `value` at `path` inside `root`.
///
/// Writing at the root path replaces `*root` wholesale and always succeeds. Otherwise
/// every intermediate segment must resolve to a mapping: an absent one is created as an
/// empty mapping when `create_intermediate` is set and is [`PathError::NotFound`]
/// otherwise; one holding any other value is [`PathError::InvalidPath`] regardless of
/// `create_intermediate`.
///
/// On error `root` is left exactly as it was.
pub fn write(
    root: &mut Value,
    path: impl AsRef<Path>,
    value: Value,
    create_intermediate: bool,
) -> Result<(), PathError> {
    let path = path.as_ref();
    let Some((parent, last)) = path.split_last() else {
        *root = value;
        return Ok(());
    };

    // Validate the whole walk before inserting anything.
    check_writable(root, path, parent, create_intermediate)?;

    let mut current = root;
    for segment in parent.segments() {
        let Value::Object(map) = current else {
            return Err(PathError::invalid(path.as_str()));
        };
        current = map
            .entry(segment)
            .or_insert_with(|| Value::Object(Map::new()));
    }

    match current {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        _ => Err(PathError::invalid(path.as_str())),
    }
}

/// Walk `parent` without mutating, reporting the error `write` would hit.
fn check_writable(
    root: &Value,
    path: &Path,
    parent: &Path,
    create_intermediate: bool,
) -> Result<(), PathError> {
    // `None` once the walk has left existing data; everything below is created.
    let mut current = Some(root);
    for segment in parent.segments() {
        current = match current {
            Some(Value::Object(map)) => match map.get(segment) {
                Some(child) => Some(child),
                None if create_intermediate => None,
                None => return Err(PathError::not_found(path.as_str())),
            },
            Some(_) => return Err(PathError::invalid(path.as_str())),
            None => None,
        };
    }

    match current {
        Some(Value::Object(_)) | None => Ok(()),
        Some(_) => Err(PathError::invalid(path.as_str())),
    }
}
