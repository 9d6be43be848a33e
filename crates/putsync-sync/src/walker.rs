//! Snapshot walkers
//!
//! Both walkers produce a flat list of entries keyed by [`RelPath`]. They run
//! concurrently in [`walk_both`]; the first failure cancels the other walk
//! and aborts the pass.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use putsync_core::domain::{
    is_ignored_name, same_name, LocalEntry, RelPath, RemoteEntry, TEMP_DIR_NAME,
};
use putsync_core::ports::IRemoteFileService;

use crate::SyncError;

// ============================================================================
// Local walk
// ============================================================================

/// Returns the platform identity of a file
#[cfg(unix)]
pub fn inode_of(metadata: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
pub fn inode_of(_metadata: &std::fs::Metadata) -> u64 {
    0
}

/// Walks the local tree below `root`
///
/// The root itself, the temp-transfer directory and OS metadata files are
/// left out. Symlinks and other special files are skipped.
///
/// # Errors
/// Fails on any unreadable directory, or with [`SyncError::Cancelled`].
pub async fn walk_local(root: &Path, cancel: &CancellationToken) -> Result<Vec<LocalEntry>> {
    let mut entries = Vec::new();
    walk_local_dir(root.to_path_buf(), None, cancel, &mut entries).await?;
    debug!(count = entries.len(), "Local walk finished");
    Ok(entries)
}

fn walk_local_dir<'a>(
    dir: PathBuf,
    rel: Option<RelPath>,
    cancel: &'a CancellationToken,
    entries: &'a mut Vec<LocalEntry>,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled.into());
        }

        let mut read_dir = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

        let mut subdirs = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                warn!(path = ?entry.path(), "Skipping non UTF-8 name");
                continue;
            };
            if rel.is_none() && name == TEMP_DIR_NAME {
                continue;
            }
            if is_ignored_name(&name) {
                continue;
            }

            let relpath = match &rel {
                Some(parent) => parent.join(&name),
                None => RelPath::new(&name),
            };
            let relpath = match relpath {
                Ok(p) => p,
                Err(err) => {
                    warn!(path = ?entry.path(), %err, "Skipping invalid path");
                    continue;
                }
            };

            let metadata = entry.metadata().await?;
            if metadata.is_dir() {
                entries.push(LocalEntry {
                    relpath: relpath.clone(),
                    path: entry.path(),
                    is_dir: true,
                    size: 0,
                    inode: inode_of(&metadata),
                });
                subdirs.push((entry.path(), relpath));
            } else if metadata.is_file() {
                entries.push(LocalEntry {
                    relpath,
                    path: entry.path(),
                    is_dir: false,
                    size: metadata.len(),
                    inode: inode_of(&metadata),
                });
            }
        }

        for (path, relpath) in subdirs {
            walk_local_dir(path, Some(relpath), cancel, entries).await?;
        }
        Ok(())
    })
}

/// Maps `relpath` to a path below `root`, reusing names already on disk
///
/// Each component is matched against the existing directory entries by NFC
/// equality, so a name the filesystem keeps decomposed is found again.
/// Components that do not exist yet are spelled as in `relpath`.
pub async fn resolve_local(root: &Path, relpath: &RelPath) -> Result<PathBuf> {
    let mut path = root.to_path_buf();
    let mut components = relpath.as_str().split('/');
    for name in components.by_ref() {
        match existing_name(&path, name).await? {
            Some(found) => path.push(found),
            None => {
                path.push(name);
                break;
            }
        }
    }
    path.extend(components);
    Ok(path)
}

/// Finds the entry of `dir` whose name equals `name` after normalization
async fn existing_name(dir: &Path, name: &str) -> Result<Option<OsString>> {
    match tokio::fs::symlink_metadata(dir.join(name)).await {
        Ok(_) => return Ok(Some(OsString::from(name))),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to stat {}", dir.join(name).display()))
        }
    }

    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read directory: {}", dir.display()))
        }
    };
    while let Some(entry) = read_dir.next_entry().await? {
        let file_name = entry.file_name();
        if file_name.to_str().is_some_and(|n| same_name(n, name)) {
            return Ok(Some(file_name));
        }
    }
    Ok(None)
}

// ============================================================================
// Remote walk
// ============================================================================

/// Walks the remote tree below `root_id`
///
/// Children are sorted by ID ascending. IDs grow with upload order, so when
/// two objects share a path the newer one comes last and wins once entries
/// are keyed by path. Files of a folder are emitted before its subfolders
/// are descended into.
///
/// # Errors
/// Fails on the first failed listing, or with [`SyncError::Cancelled`].
pub async fn walk_remote(
    remote: &dyn IRemoteFileService,
    root_id: i64,
    cancel: &CancellationToken,
) -> Result<Vec<RemoteEntry>> {
    let mut entries = Vec::new();
    walk_remote_dir(remote, root_id, None, cancel, &mut entries).await?;
    debug!(count = entries.len(), "Remote walk finished");
    Ok(entries)
}

fn walk_remote_dir<'a>(
    remote: &'a dyn IRemoteFileService,
    folder_id: i64,
    rel: Option<RelPath>,
    cancel: &'a CancellationToken,
    entries: &'a mut Vec<RemoteEntry>,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let mut children = tokio::select! {
            _ = cancel.cancelled() => return Err(SyncError::Cancelled.into()),
            listed = remote.list(folder_id) => listed
                .with_context(|| format!("Failed to list remote folder {}", folder_id))?,
        };
        children.sort_by_key(|c| c.id);

        let mut subdirs = Vec::new();
        for child in children {
            if child.name.contains('/') || child.name.contains('\0') {
                warn!(id = child.id, name = ?child.name, "Skipping remote entry with invalid name");
                continue;
            }
            if rel.is_none() && child.name == TEMP_DIR_NAME {
                continue;
            }
            if is_ignored_name(&child.name) {
                continue;
            }

            let relpath = match &rel {
                Some(parent) => parent.join(&child.name),
                None => RelPath::new(&child.name),
            };
            let relpath = match relpath {
                Ok(p) => p,
                Err(err) => {
                    warn!(id = child.id, %err, "Skipping invalid remote path");
                    continue;
                }
            };

            if child.is_dir {
                subdirs.push((child.id, relpath.clone()));
            }
            entries.push(RemoteEntry {
                relpath,
                is_dir: child.is_dir,
                size: child.size,
                id: child.id,
                crc32: child.crc32,
            });
        }

        for (id, relpath) in subdirs {
            walk_remote_dir(remote, id, Some(relpath), cancel, entries).await?;
        }
        Ok(())
    })
}

// ============================================================================
// Concurrent walk
// ============================================================================

/// Walks both trees at once
///
/// If either walk fails the other is cancelled and that error is returned.
pub async fn walk_both(
    local_root: &Path,
    remote: &dyn IRemoteFileService,
    remote_root_id: i64,
    cancel: &CancellationToken,
) -> Result<(Vec<LocalEntry>, Vec<RemoteEntry>)> {
    let token = cancel.child_token();

    let local = async {
        let result = walk_local(local_root, &token).await;
        if result.is_err() {
            token.cancel();
        }
        result.context("Local walk failed")
    };
    let remote = async {
        let result = walk_remote(remote, remote_root_id, &token).await;
        if result.is_err() {
            token.cancel();
        }
        result.context("Remote walk failed")
    };

    tokio::try_join!(local, remote)
}
