//! Persisted per-path synchronization state
//!
//! One [`PersistedState`] exists per relative path. It records the identity
//! of both sides at the time they were last known to agree, plus the
//! checkpoint of an in-flight transfer.
//!
//! ## State Machine
//!
//! ```text
//!                 download started                 rename into place
//!   (no state) ──────────────────► Downloading ─────────────────────┐
//!       │                           │  ▲  offset checkpoint         │
//!       │                           └──┘                            ▼
//!       │         upload started                   server ack    Synced
//!       └────────────────────────► Uploading ───────────────────────▲
//!                                   │  ▲  session offset
//!                                   └──┘
//! ```
//!
//! Any state may be deleted by reconciliation; a move re-keys it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// SyncStatus
// ============================================================================

/// Lifecycle status of a persisted path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Both sides agree
    Synced,
    /// A download into the temp directory is in progress
    Downloading,
    /// A resumable upload session is in progress
    Uploading,
    /// A value written by another version of the program
    #[serde(other)]
    Unknown,
}

impl SyncStatus {
    /// Returns the storage representation of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Downloading => "downloading",
            SyncStatus::Uploading => "uploading",
            SyncStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(SyncStatus::Synced),
            "downloading" => Ok(SyncStatus::Downloading),
            "uploading" => Ok(SyncStatus::Uploading),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

// ============================================================================
// PersistedState
// ============================================================================

/// Durable record describing the last agreed state of one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    pub status: SyncStatus,
    pub is_dir: bool,
    /// Local file identity; zero for directories and unknown inodes
    pub local_inode: u64,
    pub remote_id: i64,
    pub size: u64,
    /// Remote content checksum as reported by the service (hex)
    pub crc32: String,
    /// Bytes transferred so far; meaningless once Synced
    pub offset: u64,
    /// Temp file name of a download, or session URL of an upload
    pub transfer_handle: Option<String>,
}

impl PersistedState {
    /// State for a directory present on both sides
    pub fn synced_dir(remote_id: i64) -> Self {
        Self {
            status: SyncStatus::Synced,
            is_dir: true,
            local_inode: 0,
            remote_id,
            size: 0,
            crc32: String::new(),
            offset: 0,
            transfer_handle: None,
        }
    }

    /// State for a file present on both sides with matching content
    pub fn synced_file(remote_id: i64, size: u64, crc32: impl Into<String>, local_inode: u64) -> Self {
        Self {
            status: SyncStatus::Synced,
            is_dir: false,
            local_inode,
            remote_id,
            size,
            crc32: crc32.into(),
            offset: 0,
            transfer_handle: None,
        }
    }

    /// State for a download that just started writing into `temp_name`
    pub fn downloading(remote_id: i64, size: u64, crc32: impl Into<String>, temp_name: impl Into<String>) -> Self {
        Self {
            status: SyncStatus::Downloading,
            is_dir: false,
            local_inode: 0,
            remote_id,
            size,
            crc32: crc32.into(),
            offset: 0,
            transfer_handle: Some(temp_name.into()),
        }
    }

    /// State for an upload session that was just created at `session_url`
    pub fn uploading(local_inode: u64, size: u64, session_url: impl Into<String>) -> Self {
        Self {
            status: SyncStatus::Uploading,
            is_dir: false,
            local_inode,
            remote_id: 0,
            size,
            crc32: String::new(),
            offset: 0,
            transfer_handle: Some(session_url.into()),
        }
    }

    /// Temp file name, when this is a download in progress
    pub fn temp_name(&self) -> Option<&str> {
        match self.status {
            SyncStatus::Downloading => self.transfer_handle.as_deref(),
            _ => None,
        }
    }

    /// Upload session URL, when this is an upload in progress
    pub fn upload_url(&self) -> Option<&str> {
        match self.status {
            SyncStatus::Uploading => self.transfer_handle.as_deref(),
            _ => None,
        }
    }
}
