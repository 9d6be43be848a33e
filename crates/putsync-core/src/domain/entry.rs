//! Snapshot entries and per-path sync records
//!
//! [`LocalEntry`] and [`RemoteEntry`] are rebuilt by the walkers on every pass.
//! [`SyncRecord`] joins them with the persisted state for the same path.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::relpath::RelPath;
use super::state::PersistedState;

/// A file or directory observed under the local root
///
/// `relpath` is the NFC join key. `path` is the name as the filesystem
/// stores it, which may be decomposed, and is what every local I/O uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalEntry {
    pub relpath: RelPath,
    pub path: PathBuf,
    pub is_dir: bool,
    pub size: u64,
    pub inode: u64,
}

/// A file or folder observed under the remote root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub relpath: RelPath,
    pub is_dir: bool,
    pub size: u64,
    /// Remote-assigned identity; increases with upload order
    pub id: i64,
    pub crc32: String,
}

/// Everything known about one relative path during a pass
///
/// At least one of `local`, `remote` and `state` is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRecord {
    pub relpath: RelPath,
    pub local: Option<LocalEntry>,
    pub remote: Option<RemoteEntry>,
    pub state: Option<PersistedState>,
    /// Set when another record already resolved this path (move target)
    pub skip: bool,
}

impl SyncRecord {
    /// Creates an empty record; callers fill at least one side before use
    pub fn new(relpath: RelPath) -> Self {
        Self {
            relpath,
            local: None,
            remote: None,
            state: None,
            skip: false,
        }
    }

    /// Returns true if no source contributed to this record
    pub fn is_empty(&self) -> bool {
        self.local.is_none() && self.remote.is_none() && self.state.is_none()
    }
}
