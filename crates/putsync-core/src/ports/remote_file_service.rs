//! Remote file service port (driven/secondary port)
//!
//! This module defines the interface to the remote storage account:
//! folder listing, folder creation, delete and move, ranged reads, and
//! resumable upload sessions.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are adapter-specific.
//!   Adapters attach a typed error (e.g. an authentication failure) that callers
//!   can recover with `downcast_ref`.
//! - Every call except the two streaming ones is expected to be bounded by a
//!   short per-call timeout inside the adapter.
//! - `RemoteFile` is a port-level DTO; walkers map it to `RemoteEntry`.

use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

/// Boxed byte stream used for ranged reads and upload bodies
pub type ByteReader = Box<dyn AsyncRead + Send + Unpin>;

/// A remote file or folder as reported by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: i64,
    pub parent_id: i64,
    pub name: String,
    pub size: u64,
    /// Content checksum (hex); empty for folders
    pub crc32: String,
    pub is_dir: bool,
}

/// Result of a completed upload session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    /// Identity assigned to the new remote file
    pub file_id: i64,
    /// Checksum computed by the service
    pub crc32: String,
}

/// Port trait for remote storage operations
#[async_trait::async_trait]
pub trait IRemoteFileService: Send + Sync {
    /// Lists the direct children of a folder
    async fn list(&self, folder_id: i64) -> anyhow::Result<Vec<RemoteFile>>;

    /// Retrieves a single file or folder
    async fn get(&self, file_id: i64) -> anyhow::Result<RemoteFile>;

    /// Creates a folder named `name` under `parent_id`
    async fn create_folder(&self, name: &str, parent_id: i64) -> anyhow::Result<RemoteFile>;

    /// Deletes files or folders
    async fn delete(&self, file_ids: &[i64]) -> anyhow::Result<()>;

    /// Moves a file under `parent_id` and renames it to `new_name`
    async fn move_file(&self, file_id: i64, parent_id: i64, new_name: &str) -> anyhow::Result<()>;

    /// Opens the content of a file starting at byte `offset`
    ///
    /// # Errors
    /// Fails unless the service answers with partial content.
    async fn open_read(&self, file_id: i64, offset: u64) -> anyhow::Result<ByteReader>;

    /// Creates a resumable upload session and returns its URL
    async fn create_upload(&self, name: &str, parent_id: i64, size: u64) -> anyhow::Result<String>;

    /// Streams `body` into the session starting at `offset`
    async fn append_upload(
        &self,
        session_url: &str,
        offset: u64,
        body: ByteReader,
    ) -> anyhow::Result<UploadResult>;

    /// Returns the number of bytes the service has received for a session
    async fn upload_offset(&self, session_url: &str) -> anyhow::Result<u64>;

    /// Discards an upload session
    async fn terminate_upload(&self, session_url: &str) -> anyhow::Result<()>;
}
