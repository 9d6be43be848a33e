//! Resumable download job
//!
//! ```text
//! fresh ──► transferring ──► finalizing ──► Synced
//!               │  ▲
//!   stall/error │  │ next pass, same size and CRC32
//!               ▼  │
//!           Downloading (offset checkpointed)
//! ```
//!
//! Content is written to a temp file under the temp-transfer directory and
//! renamed into place once complete. The offset is saved after every
//! attempt, successful or not.

use std::io::SeekFrom;

use anyhow::{Context, Result};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use putsync_core::domain::{PersistedState, RemoteEntry, SyncStatus};
use putsync_core::ports::IChangeNotifier;

use crate::jobs::JobContext;
use crate::transfer::{guard, Progress};
use crate::walker::inode_of;
use crate::roots;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Downloads `remote` to its local path, resuming `prior` when possible
pub async fn download(
    ctx: &JobContext,
    remote: &RemoteEntry,
    prior: Option<&PersistedState>,
    description: &str,
) -> Result<()> {
    let relpath = &remote.relpath;
    let (mut file, mut state) = match try_resume(ctx, remote, prior).await {
        Some(resumed) => {
            info!(path = %relpath, offset = resumed.1.offset, "Resuming download");
            resumed
        }
        None => {
            if let Some(stale) = prior.and_then(PersistedState::temp_name) {
                discard_temp(ctx, stale).await;
            }
            start_fresh(ctx, remote).await?
        }
    };

    let remaining = state.size.saturating_sub(state.offset);
    if remaining > 0 {
        let progress = Progress::new(description, state.offset, state.size);
        let cancel = ctx.cancel.child_token();
        let _stop_watch = cancel.clone().drop_guard();
        let _watch = ctx
            .notifier
            .as_ref()
            .map(|n| cancel_on_remote_change(n.as_ref(), remote.id, cancel.clone()));

        let result = async {
            let reader = ctx.remote.open_read(remote.id, state.offset).await?;
            guard(
                copy_exact(reader, &mut file, remaining, &progress),
                &progress,
                ctx.stall_timeout,
                &cancel,
            )
            .await
        }
        .await;

        // Checkpoint whatever reached the file, even on failure.
        file.flush().await?;
        state.offset += progress.transferred();
        ctx.store.put(relpath, &state).await?;
        debug!(path = %relpath, offset = state.offset, "Download checkpoint saved");
        result?;
    }

    file.sync_all().await?;
    drop(file);

    let temp_name = state.temp_name().unwrap_or_default().to_string();
    let temp_path = roots::temp_dir(&ctx.local_root).join(&temp_name);
    let final_path = ctx.local_path(relpath).await?;
    if let Some(parent) = final_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::rename(&temp_path, &final_path)
        .await
        .with_context(|| format!("Failed to move download into place: {}", final_path.display()))?;

    let inode = inode_of(&tokio::fs::metadata(&final_path).await?);
    let synced = PersistedState::synced_file(state.remote_id, state.size, state.crc32, inode);
    ctx.store.put(relpath, &synced).await
}

/// Reopens the temp file of an earlier attempt if it still matches `remote`
async fn try_resume(
    ctx: &JobContext,
    remote: &RemoteEntry,
    prior: Option<&PersistedState>,
) -> Option<(File, PersistedState)> {
    let state = prior?;
    if state.status != SyncStatus::Downloading {
        return None;
    }
    let temp_name = state.temp_name()?;
    if state.size != remote.size || state.crc32 != remote.crc32 {
        debug!(path = %remote.relpath, "Remote file changed, not resuming");
        return None;
    }

    let path = roots::temp_dir(&ctx.local_root).join(temp_name);
    let mut file = OpenOptions::new().write(true).open(&path).await.ok()?;
    let len = file.metadata().await.ok()?.len();
    if len < state.offset {
        debug!(path = %remote.relpath, len, offset = state.offset, "Temp file shorter than offset");
        return None;
    }
    file.seek(SeekFrom::Start(state.offset)).await.ok()?;
    Some((file, state.clone()))
}

/// Creates a new temp file and records the download as started
async fn start_fresh(ctx: &JobContext, remote: &RemoteEntry) -> Result<(File, PersistedState)> {
    let temp_dir = roots::temp_dir(&ctx.local_root);
    tokio::fs::create_dir_all(&temp_dir).await?;
    let (std_file, path) = tempfile::Builder::new()
        .prefix("download-")
        .tempfile_in(&temp_dir)
        .context("Failed to create temp file")?
        .keep()?;
    let temp_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let state = PersistedState::downloading(remote.id, remote.size, remote.crc32.clone(), temp_name);
    ctx.store.put(&remote.relpath, &state).await?;
    Ok((File::from_std(std_file), state))
}

/// Removes the temp file of an attempt that cannot be resumed
async fn discard_temp(ctx: &JobContext, temp_name: &str) {
    let path = roots::temp_dir(&ctx.local_root).join(temp_name);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => debug!(path = %path.display(), "Removed stale temp file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Cannot remove stale temp file"),
    }
}

/// Copies exactly `len` bytes, reporting each written chunk
async fn copy_exact(
    reader: impl AsyncRead + Unpin,
    file: &mut File,
    len: u64,
    progress: &Progress,
) -> Result<()> {
    let mut reader = reader.take(len);
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut copied = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).await?;
        copied += n as u64;
        progress.add(n as u64);
    }
    if copied < len {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("stream ended after {} of {} bytes", copied, len),
        )
        .into());
    }
    Ok(())
}

/// Cancels `token` when the notifier reports a change to `file_id`
fn cancel_on_remote_change(
    notifier: &dyn IChangeNotifier,
    file_id: i64,
    token: CancellationToken,
) -> JoinHandle<()> {
    let mut updates = notifier.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                update = updates.recv() => match update {
                    Ok(change) if change.file_id == Some(file_id) => {
                        info!(file_id, "Remote file changed during download");
                        token.cancel();
                        return;
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => return,
                }
            }
        }
    })
}
