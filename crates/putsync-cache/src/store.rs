//! SQLite implementation of IStateStore
//!
//! ## Type Mapping
//!
//! | Domain Type      | SQL Type | Strategy                                      |
//! |------------------|----------|-----------------------------------------------|
//! | RelPath          | TEXT     | `.as_str()` / `RelPath::new()`                |
//! | SyncStatus       | TEXT     | `.as_str()` / `FromStr`, unknown values kept  |
//! | inode, size, offset (u64) | INTEGER | bit-preserving `as i64` / `as u64`   |
//! | transfer handle  | TEXT     | nullable                                      |

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use putsync_core::domain::{PersistedState, RelPath, SyncStatus};
use putsync_core::ports::IStateStore;

use crate::CacheError;

/// SQLite-backed store of per-path sync state
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Creates a new store using the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Row mapping
// ============================================================================

/// Parse a stored status, keeping values written by other versions as Unknown
fn status_from_string(s: &str) -> SyncStatus {
    s.parse().unwrap_or_else(|_| {
        tracing::trace!(status = s, "Unrecognized stored status");
        SyncStatus::Unknown
    })
}

fn state_from_row(row: &SqliteRow) -> PersistedState {
    let status: String = row.get("status");
    let is_dir: bool = row.get("is_dir");
    let local_inode: i64 = row.get("local_inode");
    let remote_id: i64 = row.get("remote_id");
    let size: i64 = row.get("size");
    let crc32: String = row.get("crc32");
    let offset: i64 = row.get("transfer_offset");
    let transfer_handle: Option<String> = row.get("transfer_handle");

    PersistedState {
        status: status_from_string(&status),
        is_dir,
        local_inode: local_inode as u64,
        remote_id,
        size: size as u64,
        crc32,
        offset: offset as u64,
        transfer_handle,
    }
}

fn path_from_row(row: &SqliteRow) -> Result<RelPath, CacheError> {
    let path: String = row.get("path");
    RelPath::new(&path)
        .map_err(|e| CacheError::SerializationError(format!("Invalid stored path '{}': {}", path, e)))
}

// ============================================================================
// IStateStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IStateStore for SqliteStateStore {
    async fn get_all(&self) -> anyhow::Result<Vec<(RelPath, PersistedState)>> {
        let rows = sqlx::query("SELECT * FROM sync_states ORDER BY path")
            .fetch_all(&self.pool)
            .await?;

        let mut states = Vec::with_capacity(rows.len());
        for row in &rows {
            match path_from_row(row) {
                Ok(path) => states.push((path, state_from_row(row))),
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable state row"),
            }
        }

        tracing::trace!(count = states.len(), "Loaded persisted states");
        Ok(states)
    }

    async fn get(&self, path: &RelPath) -> anyhow::Result<Option<PersistedState>> {
        let row = sqlx::query("SELECT * FROM sync_states WHERE path = ?")
            .bind(path.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(state_from_row))
    }

    async fn put(&self, path: &RelPath, state: &PersistedState) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO sync_states \
             (path, status, is_dir, local_inode, remote_id, size, crc32, \
              transfer_offset, transfer_handle, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(path.as_str())
        .bind(state.status.as_str())
        .bind(state.is_dir)
        .bind(state.local_inode as i64)
        .bind(state.remote_id)
        .bind(state.size as i64)
        .bind(&state.crc32)
        .bind(state.offset as i64)
        .bind(&state.transfer_handle)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::trace!(path = %path, status = %state.status, offset = state.offset, "Saved state");
        Ok(())
    }

    async fn delete(&self, path: &RelPath) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM sync_states WHERE path = ?")
            .bind(path.as_str())
            .execute(&self.pool)
            .await?;

        tracing::trace!(path = %path, "Deleted state");
        Ok(())
    }

    async fn rename_key(&self, from: &RelPath, to: &RelPath) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<String> = sqlx::query_scalar("SELECT path FROM sync_states WHERE path = ?")
            .bind(from.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(CacheError::MissingKey(from.to_string()).into());
        }
        if from == to {
            return Ok(());
        }

        sqlx::query("DELETE FROM sync_states WHERE path = ?")
            .bind(to.as_str())
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE sync_states SET path = ?, updated_at = ? WHERE path = ?")
            .bind(to.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(from.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::trace!(from = %from, to = %to, "Moved state");
        Ok(())
    }
}
