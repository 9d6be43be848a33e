//! Resumable upload job
//!
//! An upload session is created remotely and its URL persisted before any
//! byte is sent. A later pass asks the service how much of the session it
//! already holds and continues from there, provided the local file still
//! has the same size and inode. A change to the file while it is being
//! sent aborts the attempt without touching the persisted state.

use std::io::SeekFrom;

use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};

use putsync_core::domain::{LocalEntry, PersistedState, RelPath};
use putsync_core::ports::ByteReader;

use crate::jobs::JobContext;
use crate::transfer::{guard, Progress, ProgressReader};
use crate::walker::inode_of;
use crate::watcher::ModificationWatch;

/// Uploads `local` to its remote path, resuming `prior` when possible
pub async fn upload(
    ctx: &JobContext,
    local: &LocalEntry,
    prior: Option<&PersistedState>,
    description: &str,
) -> Result<()> {
    let relpath = &local.relpath;
    let path = &local.path;

    // Armed before the size and inode are read so no change slips between.
    let abort = ctx.cancel.child_token();
    let watch = ModificationWatch::start(path, abort.clone())?;

    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    let size = meta.len();
    let inode = inode_of(&meta);

    let (session_url, offset) = match try_resume(ctx, relpath, prior, size, inode).await {
        Some(resumed) => {
            info!(path = %relpath, offset = resumed.1, "Resuming upload");
            resumed
        }
        None => start_fresh(ctx, relpath, size, inode).await?,
    };

    let mut file = File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    file.seek(SeekFrom::Start(offset)).await?;

    let progress = Progress::new(description, offset, size);
    let body: ByteReader = Box::new(ProgressReader::new(
        file.take(size - offset),
        progress.clone(),
    ));
    let result = guard(
        ctx.remote.append_upload(&session_url, offset, body),
        &progress,
        ctx.stall_timeout,
        &abort,
    )
    .await;

    if watch.is_modified() {
        warn!(path = %relpath, "File modified while uploading");
        return Ok(());
    }
    let uploaded = result?;

    debug!(path = %relpath, file_id = uploaded.file_id, "Upload complete");
    let state = PersistedState::synced_file(uploaded.file_id, size, uploaded.crc32, inode);
    ctx.store.put(relpath, &state).await
}

/// Returns the session URL and server-side offset of a resumable upload
async fn try_resume(
    ctx: &JobContext,
    relpath: &RelPath,
    prior: Option<&PersistedState>,
    size: u64,
    inode: u64,
) -> Option<(String, u64)> {
    let state = prior?;
    let url = state.upload_url()?;

    if state.size != size || state.local_inode != inode {
        debug!(path = %relpath, "Local file replaced since the upload started");
        abandon(ctx, url).await;
        return None;
    }

    match ctx.remote.upload_offset(url).await {
        Ok(offset) if offset <= size => Some((url.to_string(), offset)),
        Ok(offset) => {
            warn!(path = %relpath, offset, size, "Server holds more than the file size");
            abandon(ctx, url).await;
            None
        }
        Err(e) => {
            warn!(path = %relpath, error = %e, "Cannot get upload offset");
            None
        }
    }
}

/// Creates the remote parent folders and a new upload session
async fn start_fresh(
    ctx: &JobContext,
    relpath: &RelPath,
    size: u64,
    inode: u64,
) -> Result<(String, u64)> {
    let (dir, name) = relpath.split();
    let parent_id = ctx
        .dircache
        .lock()
        .await
        .mkdirp(ctx.remote.as_ref(), dir)
        .await?;
    let url = ctx.remote.create_upload(name, parent_id, size).await?;
    ctx.store
        .put(relpath, &PersistedState::uploading(inode, size, url.clone()))
        .await?;
    Ok((url, 0))
}

async fn abandon(ctx: &JobContext, url: &str) {
    if let Err(e) = ctx.remote.terminate_upload(url).await {
        debug!(url, error = %e, "Cannot remove stale upload");
    }
}
