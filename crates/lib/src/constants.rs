//! Shared constants for object names, paths and mirror events.

/// Name given to a shared state when none is supplied.
pub const DEFAULT_OBJECT_NAME: &str = "/";

/// Separator between the segments of a property path.
pub const PATH_DELIMITER: char = '.';

/// Mirror event fired for every authoritative update received from the server.
pub const CHANGE_EVENT: &str = "change";

/// Mirror event fired once the initial snapshot has been installed.
pub const SYNC_EVENT: &str = "sync";

/// Upper bound on a single encoded frame read from a stream transport.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;
