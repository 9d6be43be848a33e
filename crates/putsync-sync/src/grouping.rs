//! Merges the two snapshots and the persisted state into one record per path

use std::collections::HashMap;

use putsync_core::domain::{LocalEntry, PersistedState, RelPath, RemoteEntry, SyncRecord};

/// Groups everything known about each relative path into a [`SyncRecord`]
///
/// Keys are already NFC-normalized by [`RelPath`], so the same name written
/// in composed and decomposed form lands in one record. When several entries
/// share a path, the last one wins; the remote walker orders duplicates so
/// that this is the most recent upload.
pub fn group(
    states: Vec<(RelPath, PersistedState)>,
    local: Vec<LocalEntry>,
    remote: Vec<RemoteEntry>,
) -> HashMap<RelPath, SyncRecord> {
    let mut records: HashMap<RelPath, SyncRecord> = HashMap::new();

    for (path, state) in states {
        records
            .entry(path.clone())
            .or_insert_with(|| SyncRecord::new(path))
            .state = Some(state);
    }
    for entry in local {
        let key = entry.relpath.clone();
        records
            .entry(key.clone())
            .or_insert_with(|| SyncRecord::new(key))
            .local = Some(entry);
    }
    for entry in remote {
        let key = entry.relpath.clone();
        records
            .entry(key.clone())
            .or_insert_with(|| SyncRecord::new(key))
            .remote = Some(entry);
    }

    records
}
