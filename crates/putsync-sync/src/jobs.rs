//! Job execution
//!
//! [`JobContext`] carries everything a job needs: the local root, the remote
//! service, the state store, the pass's [`DirCache`] and the cancellation
//! signal. Jobs run one at a time, so each path's state is only ever touched
//! by the job currently processing it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use putsync_core::domain::{PersistedState, RelPath};
use putsync_core::ports::{IChangeNotifier, IRemoteFileService, IStateStore};

use crate::dircache::DirCache;
use crate::recon::Job;
use crate::{download, roots, upload, walker, SyncError};

/// Shared dependencies of every job in a pass
pub struct JobContext {
    pub local_root: PathBuf,
    pub remote: Arc<dyn IRemoteFileService>,
    pub store: Arc<dyn IStateStore>,
    pub notifier: Option<Arc<dyn IChangeNotifier>>,
    pub dircache: Mutex<DirCache>,
    pub stall_timeout: Duration,
    pub cancel: CancellationToken,
}

impl JobContext {
    /// Runs a single job
    ///
    /// # Errors
    /// Returns the first failing step. Whatever state the job had already
    /// persisted stays, so the next pass can resume from it.
    #[tracing::instrument(skip(self, job), fields(job = %job))]
    pub async fn run(&self, job: &Job) -> Result<()> {
        let description = job.to_string();
        match job {
            Job::Upload { local, state } => {
                upload::upload(self, local, state.as_ref(), &description).await
            }
            Job::Download { remote, state } => {
                download::download(self, remote, state.as_ref(), &description).await
            }
            Job::CreateLocalFolder { relpath, remote_id } => {
                self.create_local_folder(relpath, *remote_id).await
            }
            Job::CreateRemoteFolder { relpath } => self.create_remote_folder(relpath).await,
            Job::DeleteLocalFile { relpath } => self.delete_local(relpath).await,
            Job::DeleteRemoteFile { relpath, remote_id } => {
                self.delete_remote(relpath, *remote_id).await
            }
            Job::MoveLocalFile { from, to } => self.move_local(from, to).await,
            Job::MoveRemoteFile { from, to, remote_id } => {
                self.move_remote(from, to, *remote_id).await
            }
            Job::WriteFileState { local, remote } => {
                let state = PersistedState::synced_file(
                    remote.id,
                    remote.size,
                    remote.crc32.clone(),
                    local.inode,
                );
                self.store.put(&remote.relpath, &state).await
            }
            Job::WriteDirState { relpath, remote_id } => {
                self.store
                    .put(relpath, &PersistedState::synced_dir(*remote_id))
                    .await
            }
            Job::DeleteState { relpath, state } => self.delete_state(relpath, state).await,
        }
    }

    /// Local path of `relpath`, spelled the way existing entries are on disk
    pub async fn local_path(&self, relpath: &RelPath) -> Result<PathBuf> {
        walker::resolve_local(&self.local_root, relpath).await
    }

    async fn create_local_folder(&self, relpath: &RelPath, remote_id: i64) -> Result<()> {
        let path = self.local_path(relpath).await?;
        tokio::fs::create_dir_all(&path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;
        self.dircache.lock().await.set(relpath.as_str(), remote_id);
        self.store
            .put(relpath, &PersistedState::synced_dir(remote_id))
            .await
    }

    async fn create_remote_folder(&self, relpath: &RelPath) -> Result<()> {
        let remote_id = self
            .dircache
            .lock()
            .await
            .mkdirp(self.remote.as_ref(), relpath.as_str())
            .await?;
        self.store
            .put(relpath, &PersistedState::synced_dir(remote_id))
            .await
    }

    async fn delete_local(&self, relpath: &RelPath) -> Result<()> {
        let path = self.local_path(relpath).await?;
        let result = match tokio::fs::symlink_metadata(&path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&path).await,
            Ok(_) => tokio::fs::remove_file(&path).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %relpath, "Already gone locally");
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to delete {}", path.display()))
            }
        }
        self.store.delete(relpath).await
    }

    async fn delete_remote(&self, relpath: &RelPath, remote_id: i64) -> Result<()> {
        self.remote.delete(&[remote_id]).await?;
        self.store.delete(relpath).await
    }

    async fn move_local(&self, from: &RelPath, to: &RelPath) -> Result<()> {
        let old_path = self.local_path(from).await?;
        let new_path = self.local_path(to).await?;

        match tokio::fs::symlink_metadata(&new_path).await {
            Ok(_) => return Err(SyncError::MoveTargetExists(new_path).into()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(parent) = new_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&old_path, &new_path)
            .await
            .with_context(|| format!("Failed to move {} to {}", from, to))?;
        self.store.rename_key(from, to).await
    }

    async fn move_remote(&self, from: &RelPath, to: &RelPath, remote_id: i64) -> Result<()> {
        let (dir, name) = to.split();
        let parent_id = self
            .dircache
            .lock()
            .await
            .mkdirp(self.remote.as_ref(), dir)
            .await?;
        self.remote.move_file(remote_id, parent_id, name).await?;
        self.store.rename_key(from, to).await
    }

    /// Forgets a path; leftovers of an unfinished transfer are removed on a
    /// best-effort basis
    async fn delete_state(&self, relpath: &RelPath, state: &PersistedState) -> Result<()> {
        if let Some(temp_name) = state.temp_name() {
            let path = roots::temp_dir(&self.local_root).join(temp_name);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                error!(path = %path.display(), error = %e, "Cannot remove temp download file");
            }
        }
        if let Some(url) = state.upload_url() {
            if let Err(e) = self.remote.terminate_upload(url).await {
                error!(url, error = %e, "Cannot remove upload");
            }
        }
        self.store.delete(relpath).await
    }
}
