//! Sync engine - runs one reconciliation pass
//!
//! A pass discovers both roots, snapshots both trees, merges them with the
//! persisted states, computes the job list and executes it in order.
//!
//! ## Pass Flow
//!
//! ```text
//! ensure roots ─► walk local ┐
//!                            ├─► group with states ─► reconcile ─► run jobs
//!                 walk remote┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use putsync_core::config::SyncConfig;
use putsync_core::ports::{IChangeNotifier, IRemoteFileService, IStateStore};

use crate::dircache::DirCache;
use crate::jobs::JobContext;
use crate::{grouping, is_fatal, recon, roots, walker, SyncError};

// ============================================================================
// PassReport
// ============================================================================

/// Summary of a completed pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Jobs produced by reconciliation
    pub jobs_planned: usize,
    /// Jobs that ran to completion
    pub jobs_succeeded: usize,
    /// Jobs that failed; their paths are retried next pass
    pub jobs_failed: usize,
    /// Wall-clock duration of the pass in milliseconds
    pub duration_ms: u64,
}

// ============================================================================
// SyncEngine
// ============================================================================

/// Runs reconciliation passes between one local root and one remote folder
pub struct SyncEngine {
    remote: Arc<dyn IRemoteFileService>,
    store: Arc<dyn IStateStore>,
    notifier: Option<Arc<dyn IChangeNotifier>>,
    local_root: PathBuf,
    remote_folder_name: String,
    stall_timeout: Duration,
    dry_run: bool,
}

impl SyncEngine {
    /// Creates a new SyncEngine
    ///
    /// # Arguments
    /// * `remote` - Remote file service
    /// * `store` - Persisted per-path state
    /// * `notifier` - Remote change notifications; cancels downloads of changed files
    /// * `config` - Roots, stall timeout and dry-run flag
    pub fn new(
        remote: Arc<dyn IRemoteFileService>,
        store: Arc<dyn IStateStore>,
        notifier: Option<Arc<dyn IChangeNotifier>>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            remote,
            store,
            notifier,
            local_root: config.local_root.clone(),
            remote_folder_name: config.remote_folder_name.clone(),
            stall_timeout: config.stall_timeout(),
            dry_run: config.dry_run,
        }
    }

    pub fn local_root(&self) -> &PathBuf {
        &self.local_root
    }

    /// Runs one complete pass
    ///
    /// Failing jobs are logged and counted; the rest of the queue still runs.
    ///
    /// # Errors
    /// Fails if a root cannot be prepared, a walk fails, the state store
    /// cannot be read, `cancel` fires, or a job hits an authentication or
    /// configuration error. The remaining jobs are dropped in that case.
    #[tracing::instrument(skip(self, cancel), fields(root = %self.local_root.display()))]
    pub async fn run_pass(&self, cancel: &CancellationToken) -> Result<PassReport> {
        let start = Instant::now();
        let mut report = PassReport::default();

        roots::ensure_local_root(&self.local_root).await?;
        let root_id = roots::ensure_remote_root(self.remote.as_ref(), &self.remote_folder_name).await?;

        let (local, remote) =
            walker::walk_both(&self.local_root, self.remote.as_ref(), root_id, cancel).await?;
        let dircache = DirCache::seeded(root_id, &remote);
        let states = self.store.get_all().await?;
        info!(
            local = local.len(),
            remote = remote.len(),
            states = states.len(),
            "Snapshots taken"
        );

        let jobs = recon::reconcile(grouping::group(states, local, remote));
        report.jobs_planned = jobs.len();

        if self.dry_run {
            for job in &jobs {
                info!("[dry-run] {}", job);
            }
            report.duration_ms = start.elapsed().as_millis() as u64;
            return Ok(report);
        }

        let ctx = JobContext {
            local_root: self.local_root.clone(),
            remote: Arc::clone(&self.remote),
            store: Arc::clone(&self.store),
            notifier: self.notifier.clone(),
            dircache: Mutex::new(dircache),
            stall_timeout: self.stall_timeout,
            cancel: cancel.clone(),
        };

        for job in &jobs {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled.into());
            }
            info!("{}", job);
            match ctx.run(job).await {
                Ok(()) => report.jobs_succeeded += 1,
                Err(e) if is_fatal(&e) => {
                    error!(job = %job, error = %e, "Fatal error, aborting pass");
                    return Err(e);
                }
                Err(e) => {
                    error!(job = %job, error = format!("{e:#}"), "Job failed");
                    report.jobs_failed += 1;
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            planned = report.jobs_planned,
            succeeded = report.jobs_succeeded,
            failed = report.jobs_failed,
            duration_ms = report.duration_ms,
            "Pass complete"
        );
        Ok(report)
    }
}
