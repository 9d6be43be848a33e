//! Local and remote root discovery

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use putsync_core::domain::TEMP_DIR_NAME;
use putsync_core::ports::IRemoteFileService;

use crate::SyncError;

/// Remote ID of the account's top folder
pub const ACCOUNT_ROOT_ID: i64 = 0;

/// Returns the directory holding in-progress downloads
pub fn temp_dir(local_root: &Path) -> PathBuf {
    local_root.join(TEMP_DIR_NAME)
}

/// Creates the local root and its temp-transfer directory
///
/// # Errors
/// Returns [`SyncError::Config`] if the root exists but is not a directory.
pub async fn ensure_local_root(local_root: &Path) -> Result<()> {
    match tokio::fs::metadata(local_root).await {
        Ok(meta) if !meta.is_dir() => {
            return Err(SyncError::Config(format!(
                "local root {} is not a directory",
                local_root.display()
            ))
            .into());
        }
        _ => {}
    }
    tokio::fs::create_dir_all(temp_dir(local_root))
        .await
        .with_context(|| format!("Failed to create local root {}", local_root.display()))?;
    Ok(())
}

/// Finds the folder named `name` under the account root, creating it if needed
///
/// # Returns
/// The folder's remote ID
pub async fn ensure_remote_root(remote: &dyn IRemoteFileService, name: &str) -> Result<i64> {
    let children = remote
        .list(ACCOUNT_ROOT_ID)
        .await
        .context("Failed to list account root")?;
    if let Some(folder) = children.iter().find(|f| f.is_dir && f.name == name) {
        debug!(id = folder.id, name, "Found remote root folder");
        return Ok(folder.id);
    }

    let folder = remote
        .create_folder(name, ACCOUNT_ROOT_ID)
        .await
        .with_context(|| format!("Failed to create remote root folder {:?}", name))?;
    info!(id = folder.id, name, "Created remote root folder");
    Ok(folder.id)
}
