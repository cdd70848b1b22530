//! Store handle for a registry workspace.

use std::path::PathBuf;

/// Handle to a registry state workspace.
///
/// All entity tables, the event log, and the blob directory live under
/// `root`. Opening a store performs no I/O; `initialize_registry_db` creates
/// the directory and schema on first use.
#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the store root directory.
    pub root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}
