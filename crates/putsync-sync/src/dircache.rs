//! Remote folder path to ID memoization
//!
//! Seeded at the start of a pass from the remote walk and extended as jobs
//! create folders. Lives only for one pass.

use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::debug;

use putsync_core::domain::RemoteEntry;
use putsync_core::ports::IRemoteFileService;

/// Resolves remote folder paths to IDs, creating missing folders
#[derive(Debug, Clone)]
pub struct DirCache {
    root_id: i64,
    ids: HashMap<String, i64>,
}

impl DirCache {
    /// Creates a cache whose empty path resolves to `root_id`
    pub fn new(root_id: i64) -> Self {
        Self {
            root_id,
            ids: HashMap::new(),
        }
    }

    /// Creates a cache pre-filled with the folders seen by the remote walk
    pub fn seeded(root_id: i64, entries: &[RemoteEntry]) -> Self {
        let mut cache = Self::new(root_id);
        for entry in entries.iter().filter(|e| e.is_dir) {
            cache.set(entry.relpath.as_str(), entry.id);
        }
        cache
    }

    pub fn set(&mut self, relpath: &str, id: i64) {
        self.ids.insert(relpath.trim_end_matches('/').to_string(), id);
    }

    pub fn get(&self, relpath: &str) -> Option<i64> {
        let relpath = relpath.trim_end_matches('/');
        if relpath.is_empty() {
            return Some(self.root_id);
        }
        self.ids.get(relpath).copied()
    }

    /// Returns the ID of the folder at `relpath`, creating it and any
    /// missing ancestors on the remote
    ///
    /// # Errors
    /// Fails if a folder cannot be created; folders created before the
    /// failure stay cached.
    pub async fn mkdirp(&mut self, remote: &dyn IRemoteFileService, relpath: &str) -> Result<i64> {
        let relpath = relpath.trim_end_matches('/');
        if let Some(id) = self.get(relpath) {
            return Ok(id);
        }

        let mut parent_id = self.root_id;
        let mut prefix = String::with_capacity(relpath.len());
        for name in relpath.split('/').filter(|c| !c.is_empty()) {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(name);

            parent_id = match self.ids.get(&prefix) {
                Some(id) => *id,
                None => {
                    debug!(path = %prefix, parent_id, "Creating remote folder");
                    let folder = remote
                        .create_folder(name, parent_id)
                        .await
                        .with_context(|| format!("Failed to create remote folder {:?}", prefix))?;
                    self.ids.insert(prefix.clone(), folder.id);
                    folder.id
                }
            };
        }
        Ok(parent_id)
    }
}
