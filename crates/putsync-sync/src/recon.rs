//! Reconciliation: deciding one action per path
//!
//! [`reconcile`] is a pure function. It looks at what each path is on the
//! local side, on the remote side and in the persisted state, and returns the
//! jobs that bring the two sides together. Nothing here touches the
//! filesystem, the network or the state store.
//!
//! ## Decision order
//!
//! 1. Records that have a persisted state, via `sync_with_state`. This is
//!    where renames are detected, and move targets get marked `skip`.
//! 2. Records without state that were not claimed as a move target, via
//!    `sync_fresh`.
//!
//! Within each phase records are visited children first, so a folder's
//! contents are handled before the folder itself is moved or deleted.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

use putsync_core::domain::{
    children_first, LocalEntry, PersistedState, RelPath, RemoteEntry, SyncRecord, SyncStatus,
};

// ============================================================================
// Job
// ============================================================================

/// A single action decided by reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Copy a local file to the remote, resuming `state` if it is an upload
    Upload {
        local: LocalEntry,
        state: Option<PersistedState>,
    },
    /// Copy a remote file to the local side, resuming `state` if it is a download
    Download {
        remote: RemoteEntry,
        state: Option<PersistedState>,
    },
    CreateLocalFolder {
        relpath: RelPath,
        remote_id: i64,
    },
    CreateRemoteFolder {
        relpath: RelPath,
    },
    DeleteLocalFile {
        relpath: RelPath,
    },
    DeleteRemoteFile {
        relpath: RelPath,
        remote_id: i64,
    },
    /// Rename a local file to follow a rename made on the remote side
    MoveLocalFile {
        from: RelPath,
        to: RelPath,
    },
    /// Rename a remote file to follow a rename made on the local side
    MoveRemoteFile {
        from: RelPath,
        to: RelPath,
        remote_id: i64,
    },
    /// Both sides hold the same file; record it as synced
    WriteFileState {
        local: LocalEntry,
        remote: RemoteEntry,
    },
    WriteDirState {
        relpath: RelPath,
        remote_id: i64,
    },
    /// Forget a path, cleaning up any transfer it had in flight
    DeleteState {
        relpath: RelPath,
        state: PersistedState,
    },
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Upload { local, .. } => write!(f, "Uploading {:?}", local.relpath.as_str()),
            Job::Download { remote, .. } => {
                write!(f, "Downloading {:?}", remote.relpath.as_str())
            }
            Job::CreateLocalFolder { relpath, .. } => {
                write!(f, "Creating local folder {:?}", relpath.as_str())
            }
            Job::CreateRemoteFolder { relpath } => {
                write!(f, "Creating remote folder {:?}", relpath.as_str())
            }
            Job::DeleteLocalFile { relpath } => {
                write!(f, "Deleting local file {:?}", relpath.as_str())
            }
            Job::DeleteRemoteFile { relpath, .. } => {
                write!(f, "Deleting remote file {:?}", relpath.as_str())
            }
            Job::MoveLocalFile { from, to } => write!(
                f,
                "Moving local file from {:?} to {:?}",
                from.as_str(),
                to.as_str()
            ),
            Job::MoveRemoteFile { from, to, .. } => write!(
                f,
                "Moving remote file from {:?} to {:?}",
                from.as_str(),
                to.as_str()
            ),
            Job::WriteFileState { remote, .. } => {
                write!(f, "Saving file state {:?}", remote.relpath.as_str())
            }
            Job::WriteDirState { relpath, .. } => {
                write!(f, "Saving folder state {:?}", relpath.as_str())
            }
            Job::DeleteState { relpath, .. } => {
                write!(f, "Deleting state {:?}", relpath.as_str())
            }
        }
    }
}

// ============================================================================
// reconcile
// ============================================================================

/// Computes the jobs for one pass
///
/// The output is deterministic for a given input and ordered children
/// before ancestors.
pub fn reconcile(records: HashMap<RelPath, SyncRecord>) -> Vec<Job> {
    let mut records: Vec<SyncRecord> = records.into_values().filter(|r| !r.is_empty()).collect();
    records.sort_by(|a, b| children_first(&a.relpath, &b.relpath));

    // Built from the sorted list so duplicate identities resolve the same way
    // on every run.
    let mut by_remote_id: HashMap<i64, usize> = HashMap::new();
    let mut by_local_inode: HashMap<u64, usize> = HashMap::new();
    for (i, record) in records.iter().enumerate() {
        if let Some(remote) = &record.remote {
            by_remote_id.insert(remote.id, i);
        }
        if let Some(local) = &record.local {
            by_local_inode.insert(local.inode, i);
        }
    }

    let mut jobs = Vec::new();

    for i in 0..records.len() {
        if records[i].state.is_none() {
            continue;
        }
        let (decided, move_target) =
            sync_with_state(&records[i], &records, &by_remote_id, &by_local_inode);
        if let Some(target) = move_target {
            records[target].skip = true;
        }
        jobs.extend(decided);
    }

    for record in &records {
        if record.state.is_none() && !record.skip {
            jobs.extend(sync_fresh(record));
        }
    }

    jobs
}

/// Decides a path seen for the first time
fn sync_fresh(record: &SyncRecord) -> Option<Job> {
    match (&record.local, &record.remote) {
        (Some(local), None) if local.is_dir => Some(Job::CreateRemoteFolder {
            relpath: record.relpath.clone(),
        }),
        (Some(local), None) => Some(Job::Upload {
            local: local.clone(),
            state: None,
        }),
        (None, Some(remote)) if remote.is_dir => Some(Job::CreateLocalFolder {
            relpath: record.relpath.clone(),
            remote_id: remote.id,
        }),
        (None, Some(remote)) => Some(Job::Download {
            remote: remote.clone(),
            state: None,
        }),
        (Some(local), Some(remote)) => {
            if local.is_dir && remote.is_dir {
                Some(Job::WriteDirState {
                    relpath: record.relpath.clone(),
                    remote_id: remote.id,
                })
            } else if local.is_dir || remote.is_dir {
                warn!(path = %record.relpath, "Conflicting file, skipping sync");
                None
            } else if local.size != remote.size {
                warn!(path = %record.relpath, "File sizes differ, skipping sync");
                None
            } else {
                // Equal sizes are taken as equal content.
                Some(Job::WriteFileState {
                    local: local.clone(),
                    remote: remote.clone(),
                })
            }
        }
        (None, None) => None,
    }
}

/// Decides a path that has persisted state
///
/// # Returns
/// The jobs for this record and, when a rename was detected, the index of
/// the record that received it.
fn sync_with_state(
    record: &SyncRecord,
    records: &[SyncRecord],
    by_remote_id: &HashMap<i64, usize>,
    by_local_inode: &HashMap<u64, usize>,
) -> (Vec<Job>, Option<usize>) {
    let Some(state) = &record.state else {
        return (Vec::new(), None);
    };
    let relpath = &record.relpath;

    match state.status {
        SyncStatus::Synced => match (&record.local, &record.remote) {
            (Some(local), Some(remote)) => {
                if local.is_dir && remote.is_dir {
                    return (Vec::new(), None);
                }
                if local.is_dir || remote.is_dir {
                    warn!(path = %relpath, "Conflicting file, skipping sync");
                    return (Vec::new(), None);
                }
                if state.size != local.size || state.size != remote.size {
                    warn!(path = %relpath, "File sizes differ, skipping sync");
                }
                (Vec::new(), None)
            }
            (Some(local), None) => {
                // Gone remotely: deleted, or renamed if its ID shows up elsewhere.
                let target = by_remote_id.get(&state.remote_id).copied().filter(|&t| {
                    let candidate = &records[t];
                    candidate.state.is_none()
                        && candidate
                            .remote
                            .as_ref()
                            .is_some_and(|r| r.crc32 == state.crc32)
                        && local.inode == state.local_inode
                });
                match target {
                    Some(t) => {
                        debug!(from = %relpath, to = %records[t].relpath, "Remote rename detected");
                        (
                            vec![Job::MoveLocalFile {
                                from: relpath.clone(),
                                to: records[t].relpath.clone(),
                            }],
                            Some(t),
                        )
                    }
                    None => (
                        vec![Job::DeleteLocalFile {
                            relpath: relpath.clone(),
                        }],
                        None,
                    ),
                }
            }
            (None, Some(remote)) => {
                // Gone locally: deleted, or renamed if its inode shows up elsewhere.
                let target = by_local_inode.get(&state.local_inode).copied().filter(|&t| {
                    let candidate = &records[t];
                    candidate.state.is_none()
                        && remote.crc32 == state.crc32
                        && candidate
                            .local
                            .as_ref()
                            .is_some_and(|l| !l.is_dir && l.inode == state.local_inode)
                });
                match target {
                    Some(t) => {
                        debug!(from = %relpath, to = %records[t].relpath, "Local rename detected");
                        (
                            vec![Job::MoveRemoteFile {
                                from: relpath.clone(),
                                to: records[t].relpath.clone(),
                                remote_id: remote.id,
                            }],
                            Some(t),
                        )
                    }
                    None => (
                        vec![Job::DeleteRemoteFile {
                            relpath: relpath.clone(),
                            remote_id: remote.id,
                        }],
                        None,
                    ),
                }
            }
            (None, None) => (vec![delete_state(record, state)], None),
        },
        SyncStatus::Downloading => {
            if let (None, Some(remote)) = (&record.local, &record.remote) {
                if remote.crc32 == state.crc32 {
                    return (
                        vec![Job::Download {
                            remote: remote.clone(),
                            state: Some(state.clone()),
                        }],
                        None,
                    );
                }
            }
            (restart(record, state), None)
        }
        SyncStatus::Uploading => {
            if let (Some(local), None) = (&record.local, &record.remote) {
                if local.inode == state.local_inode {
                    return (
                        vec![Job::Upload {
                            local: local.clone(),
                            state: Some(state.clone()),
                        }],
                        None,
                    );
                }
            }
            (restart(record, state), None)
        }
        SyncStatus::Unknown => (vec![delete_state(record, state)], None),
    }
}

fn delete_state(record: &SyncRecord, state: &PersistedState) -> Job {
    Job::DeleteState {
        relpath: record.relpath.clone(),
        state: state.clone(),
    }
}

/// Abandons an in-flight transfer and decides the path afresh
fn restart(record: &SyncRecord, state: &PersistedState) -> Vec<Job> {
    let mut jobs = vec![delete_state(record, state)];
    jobs.extend(sync_fresh(record));
    jobs
}
