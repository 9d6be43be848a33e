//! Sync scheduler - repeats passes on timer, local and remote triggers
//!
//! The [`SyncScheduler`] owns the [`SyncEngine`](super::engine::SyncEngine)
//! and decides when the next pass starts.
//!
//! ## Flow
//!
//! ```text
//! repeat timer ────────────────────────────────┐
//! local watcher ──→ mpsc::Receiver ──┐         │
//!                                    ├─ debounce ┴─→ SyncEngine::run_pass
//! remote notifier ──→ broadcast ─────┘
//! ```
//!
//! A local or remote trigger opens a debounce window that every further
//! trigger extends, so a burst of changes turns into a single pass.

use std::time::Duration;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use putsync_core::ports::RemoteChange;

use crate::engine::SyncEngine;
use crate::is_fatal;

/// Runs sync passes until shutdown or a fatal error
pub struct SyncScheduler {
    engine: SyncEngine,
    /// Triggers from the local filesystem watcher
    local_rx: Option<mpsc::Receiver<()>>,
    /// Updates from the remote change notifier
    remote_rx: Option<broadcast::Receiver<RemoteChange>>,
    /// Pause between passes, or `None` for a single pass
    repeat: Option<Duration>,
    debounce: Duration,
}

impl SyncScheduler {
    /// Creates a new `SyncScheduler`
    ///
    /// # Arguments
    /// * `engine` - Runs the passes
    /// * `repeat` - Interval between passes; `None` runs exactly one pass
    /// * `debounce` - Quiet period required after a trigger before a pass starts
    pub fn new(engine: SyncEngine, repeat: Option<Duration>, debounce: Duration) -> Self {
        info!(
            ?repeat,
            debounce_ms = debounce.as_millis() as u64,
            "Creating sync scheduler"
        );
        Self {
            engine,
            local_rx: None,
            remote_rx: None,
            repeat,
            debounce,
        }
    }

    /// Adds the local filesystem watcher as a trigger source
    pub fn with_local_triggers(mut self, rx: mpsc::Receiver<()>) -> Self {
        self.local_rx = Some(rx);
        self
    }

    /// Adds the remote change notifier as a trigger source
    pub fn with_remote_changes(mut self, rx: broadcast::Receiver<RemoteChange>) -> Self {
        self.remote_rx = Some(rx);
        self
    }

    /// Main loop of the scheduler
    ///
    /// Runs a pass immediately, then one per trigger. Returns `Ok` once
    /// `shutdown` fires, or after the first pass in single-pass mode.
    ///
    /// # Errors
    /// Returns authentication and configuration errors, which end the loop.
    /// In single-pass mode, any pass error is returned.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        info!("Sync scheduler starting");

        loop {
            let result = self.engine.run_pass(&shutdown).await;
            if shutdown.is_cancelled() {
                break;
            }

            let Some(repeat) = self.repeat else {
                return result.map(|_| ());
            };
            match result {
                Ok(_) => {}
                Err(e) if is_fatal(&e) => {
                    error!(error = format!("{e:#}"), "Fatal sync error, stopping");
                    return Err(e);
                }
                Err(e) => error!(error = format!("{e:#}"), "Sync pass failed"),
            }

            if !self.wait_for_trigger(repeat, &shutdown).await {
                break;
            }
        }

        info!("Sync scheduler stopped");
        Ok(())
    }

    /// Waits until the next pass is due
    ///
    /// # Returns
    /// `false` if `shutdown` fired while waiting
    async fn wait_for_trigger(&mut self, repeat: Duration, shutdown: &CancellationToken) -> bool {
        let timer = tokio::time::sleep(repeat);
        tokio::pin!(timer);

        tokio::select! {
            _ = shutdown.cancelled() => return false,
            _ = &mut timer => {
                debug!("Repeat interval elapsed");
                return true;
            }
            _ = next_local(&mut self.local_rx) => debug!("Local change"),
            change = next_remote(&mut self.remote_rx) => debug!(?change, "Remote change"),
        }

        self.settle(shutdown).await
    }

    /// Waits until no trigger has arrived for the debounce period
    async fn settle(&mut self, shutdown: &CancellationToken) -> bool {
        let quiet = tokio::time::sleep(self.debounce);
        tokio::pin!(quiet);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return false,
                _ = &mut quiet => return true,
                _ = next_local(&mut self.local_rx) => {
                    quiet.as_mut().reset(Instant::now() + self.debounce);
                }
                _ = next_remote(&mut self.remote_rx) => {
                    quiet.as_mut().reset(Instant::now() + self.debounce);
                }
            }
        }
    }
}

/// Next local trigger; never resolves once the watcher is gone
async fn next_local(rx: &mut Option<mpsc::Receiver<()>>) {
    if let Some(receiver) = rx {
        if receiver.recv().await.is_some() {
            return;
        }
        debug!("Local trigger channel closed");
        *rx = None;
    }
    std::future::pending::<()>().await
}

/// Next remote change; never resolves once the notifier is gone
async fn next_remote(rx: &mut Option<broadcast::Receiver<RemoteChange>>) -> RemoteChange {
    if let Some(receiver) = rx {
        match receiver.recv().await {
            Ok(change) => return change,
            Err(broadcast::error::RecvError::Lagged(_)) => return RemoteChange::unspecified(),
            Err(broadcast::error::RecvError::Closed) => {
                debug!("Remote change channel closed");
                *rx = None;
            }
        }
    }
    std::future::pending().await
}

// ============================================================================
// Unit tests
// ============================================================================
