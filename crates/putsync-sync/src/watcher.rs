//! Local filesystem change notifications
//!
//! Provides a [`FileWatcher`] that wraps the `notify` crate to monitor the
//! sync root, converting raw OS events into [`ChangeEvent`] values. Only the
//! fact that something changed matters to the scheduler; what changed is
//! worked out by the next pass.
//!
//! ## Architecture
//!
//! ```text
//! inotify / kqueue
//!       │
//!       ▼
//!  FileWatcher ──→ mpsc::channel ──→ run_local_watcher ──→ SyncScheduler
//!                                     (filters, re-watches)
//! ```
//!
//! [`ModificationWatch`] is the single-file variant used while uploading.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use putsync_core::domain::{is_ignored_name, RelPath};

/// Delay before re-establishing a watch that ended
const REWATCH_DELAY: Duration = Duration::from_secs(1);

const EVENT_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// ChangeEvent
// ============================================================================

/// A filesystem change detected by the watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    Renamed { old: PathBuf, new: PathBuf },
}

impl ChangeEvent {
    /// Returns the primary path associated with this event
    ///
    /// For rename events, this returns the new (destination) path.
    pub fn path(&self) -> &Path {
        match self {
            ChangeEvent::Created(p) => p,
            ChangeEvent::Modified(p) => p,
            ChangeEvent::Deleted(p) => p,
            ChangeEvent::Renamed { new, .. } => new,
        }
    }
}

// ============================================================================
// FileWatcher
// ============================================================================

/// Recursive watch on the sync root
///
/// The event channel closes when the OS watcher reports an error, which
/// tells the owner to set up a new watch.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FileWatcher {
    /// Creates a watcher for `root` without starting it
    ///
    /// # Returns
    /// The watcher and a bounded receiver of relevant [`ChangeEvent`]s.
    /// Events that do not fit in the channel are dropped.
    ///
    /// # Errors
    /// Returns an error if the underlying OS watcher cannot be created
    pub fn new(root: &Path) -> Result<(Self, mpsc::Receiver<ChangeEvent>)> {
        let (event_tx, event_rx) = mpsc::channel::<ChangeEvent>(EVENT_CHANNEL_CAPACITY);
        let mut tx = Some(event_tx);
        let filter_root = root.to_path_buf();

        let watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    let Some(sender) = tx.as_ref() else { return };
                    let Some(change) = map_notify_event(&event) else { return };
                    if !is_relevant(&filter_root, change.path()) {
                        return;
                    }
                    if let Err(mpsc::error::TrySendError::Closed(_)) = sender.try_send(change) {
                        tx = None;
                    }
                }
                Err(err) => {
                    error!(error = %err, "File watcher error");
                    tx = None;
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create file watcher")?;

        Ok((
            Self {
                watcher,
                root: root.to_path_buf(),
            },
            event_rx,
        ))
    }

    /// Starts watching the root recursively
    ///
    /// # Errors
    /// Returns an error if the root cannot be watched (missing, permissions,
    /// or the inotify watch limit was reached)
    pub fn watch(&mut self) -> Result<()> {
        info!(path = %self.root.display(), "Starting recursive watch");
        self.watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch path: {}", self.root.display()))
    }
}

/// Converts a `notify::Event` into a [`ChangeEvent`]
///
/// Access events are ignored.
fn map_notify_event(event: &notify::Event) -> Option<ChangeEvent> {
    let paths = &event.paths;

    match &event.kind {
        EventKind::Create(_) => Some(ChangeEvent::Created(paths.first()?.clone())),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() >= 2 => {
            Some(ChangeEvent::Renamed {
                old: paths[0].clone(),
                new: paths[1].clone(),
            })
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(ChangeEvent::Modified(paths.first()?.clone())),
        EventKind::Remove(_) => Some(ChangeEvent::Deleted(paths.first()?.clone())),
        _ => None,
    }
}

/// Returns false for paths reconciliation never looks at
fn is_relevant(root: &Path, path: &Path) -> bool {
    if path == root {
        return true;
    }
    let Some(rel) = RelPath::from_local(root, path) else {
        return false;
    };
    !rel.is_in_temp_dir() && !is_ignored_name(rel.name())
}

// ============================================================================
// Watch loop
// ============================================================================

/// Watches `root` and sends a trigger for every relevant change
///
/// Triggers are sent without blocking; when one is already pending the new
/// one is dropped. If the watch cannot be set up or ends, it is set up again
/// after a second. Returns when `shutdown` fires or the trigger receiver is
/// gone.
pub async fn run_local_watcher(
    root: PathBuf,
    trigger: mpsc::Sender<()>,
    shutdown: CancellationToken,
) {
    loop {
        match FileWatcher::new(&root).and_then(|(mut w, rx)| w.watch().map(|_| (w, rx))) {
            Ok((_watcher, mut events)) => loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    event = events.recv() => match event {
                        Some(event) => {
                            debug!(path = %event.path().display(), "Local change");
                            if let Err(mpsc::error::TrySendError::Closed(_)) = trigger.try_send(()) {
                                return;
                            }
                            if matches!(&event, ChangeEvent::Deleted(p) if p == &root) {
                                warn!(path = %root.display(), "Sync root removed");
                                break;
                            }
                        }
                        None => {
                            warn!("File watcher stopped");
                            break;
                        }
                    }
                }
            },
            Err(err) => error!(error = %err, "Cannot watch local folder"),
        }

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(REWATCH_DELAY) => {}
        }
    }
}

// ============================================================================
// ModificationWatch
// ============================================================================

/// Watch on a single file that cancels a token when the file changes
///
/// A write, removal or rename counts as a change. Reads do not.
pub struct ModificationWatch {
    _watcher: RecommendedWatcher,
    modified: Arc<AtomicBool>,
}

impl ModificationWatch {
    /// Starts watching `path`; `token` is cancelled on the first change
    ///
    /// # Errors
    /// Returns an error if the file cannot be watched
    pub fn start(path: &Path, token: CancellationToken) -> Result<Self> {
        let modified = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&modified);

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) if is_modification(&event.kind) => {
                    if !flag.swap(true, Ordering::SeqCst) {
                        debug!(kind = ?event.kind, "Watched file modified");
                        token.cancel();
                    }
                }
                Ok(_) => {}
                Err(err) => error!(error = %err, "File watch error"),
            },
            notify::Config::default(),
        )
        .context("Failed to create file watcher")?;

        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch file: {}", path.display()))?;

        Ok(Self {
            _watcher: watcher,
            modified,
        })
    }

    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::SeqCst)
    }
}

fn is_modification(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Remove(_)
    )
}
