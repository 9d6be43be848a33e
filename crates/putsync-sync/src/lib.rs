//! putsync Sync - Reconciliation and transfer engine
//!
//! Provides:
//! - Concurrent snapshot walks of the local and remote trees
//! - A pure reconciliation function turning per-path records into jobs
//! - Resumable downloads and uploads with stall detection
//! - Scheduling of repeated passes from timer, local and remote triggers
//!
//! ## Modules
//!
//! - [`walker`] - Local and remote snapshot walkers
//! - [`grouping`] - Merges snapshots and persisted state into per-path records
//! - [`recon`] - The [`Job`](recon::Job) type and the reconciliation function
//! - [`jobs`] - Job execution against the filesystem, remote and state store
//! - [`download`] / [`upload`] - Resumable transfer jobs
//! - [`dircache`] - Remote folder path to ID memoization
//! - [`transfer`] - Inactivity watchdog and progress logging for streams
//! - [`roots`] - Local root and remote root folder discovery
//! - [`engine`] - Runs one complete pass
//! - [`watcher`] - Local filesystem change notifications
//! - [`scheduler`] - Repeats passes on triggers with debouncing

pub mod dircache;
pub mod download;
pub mod engine;
pub mod grouping;
pub mod jobs;
pub mod recon;
pub mod roots;
pub mod scheduler;
pub mod transfer;
pub mod upload;
pub mod walker;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;

use std::path::PathBuf;

use thiserror::Error;

pub use engine::{PassReport, SyncEngine};
pub use recon::{reconcile, Job};
pub use scheduler::SyncScheduler;

/// Errors that can occur during synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// Something already occupies the destination of a local move
    #[error("File already exists at move target: {0}")]
    MoveTargetExists(PathBuf),

    /// No bytes arrived within the inactivity window
    #[error("Transfer stalled: no data for {0} seconds")]
    Stalled(u64),

    /// The operation was cancelled by shutdown or a change notification
    #[error("Cancelled")]
    Cancelled,

    /// The configuration cannot be used to sync
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Returns true if the error must stop the scheduler
///
/// Authentication and configuration failures fail again on every retry.
/// Everything else is retried on the next pass.
pub fn is_fatal(err: &anyhow::Error) -> bool {
    putsync_remote::is_auth_error(err) || is_config_error(err)
}

/// Returns true if the error is a configuration problem rather than an auth one
pub fn is_config_error(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| matches!(cause.downcast_ref::<SyncError>(), Some(SyncError::Config(_))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use putsync_remote::RemoteError;

    #[test]
    fn auth_and_config_errors_are_fatal() {
        let auth: anyhow::Result<()> =
            Err(RemoteError::Unauthorized("files/list".into())).context("Walking remote tree");
        assert!(is_fatal(&auth.unwrap_err()));

        let config = anyhow::Error::new(SyncError::Config("local root is a file".into()));
        assert!(is_fatal(&config));
        assert!(is_config_error(&config));
    }

    #[test]
    fn transfer_errors_are_not_fatal() {
        assert!(!is_fatal(&anyhow::Error::new(SyncError::Stalled(10))));
        assert!(!is_fatal(&anyhow::Error::new(RemoteError::UnexpectedStatus(500))));
        assert!(!is_fatal(&anyhow::anyhow!("permission denied")));
    }

    #[test]
    fn error_display() {
        let err = SyncError::MoveTargetExists(PathBuf::from("/root/b.txt"));
        assert_eq!(err.to_string(), "File already exists at move target: /root/b.txt");
        assert_eq!(SyncError::Stalled(10).to_string(), "Transfer stalled: no data for 10 seconds");
    }
}
