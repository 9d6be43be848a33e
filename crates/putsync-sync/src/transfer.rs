//! Stall detection and progress logging for file transfers
//!
//! A transfer reports every chunk to a shared [`Progress`]. [`guard`] drives
//! the transfer future and fails it with [`SyncError::Stalled`] when no chunk
//! arrives within the inactivity window. Each chunk pushes the deadline
//! forward. Once every byte has passed, the remote may still be working on
//! its answer (an upload is checksummed before it is acknowledged), so the
//! window widens to [`ACK_TIMEOUT`]. Progress is logged once per second
//! while the transfer runs.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::SyncError;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Longest wait for the remote to answer after the last byte was sent
pub const ACK_TIMEOUT: Duration = Duration::from_secs(300);
const MB: f64 = 1024.0 * 1024.0;

/// Byte counter shared between a transfer and its watchdog
#[derive(Debug)]
pub struct Progress {
    prefix: String,
    start: u64,
    total: u64,
    transferred: AtomicU64,
    activity: Notify,
}

impl Progress {
    /// Creates a counter for a transfer resuming at `start` of `total` bytes
    pub fn new(prefix: impl Into<String>, start: u64, total: u64) -> Arc<Self> {
        Arc::new(Self {
            prefix: prefix.into(),
            start,
            total,
            transferred: AtomicU64::new(0),
            activity: Notify::new(),
        })
    }

    /// Records `n` bytes moved and resets the inactivity timer
    pub fn add(&self, n: u64) {
        if n == 0 {
            return;
        }
        self.transferred.fetch_add(n, Ordering::SeqCst);
        self.activity.notify_one();
    }

    /// Bytes moved by this attempt
    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::SeqCst)
    }

    /// Absolute position in the file
    pub fn position(&self) -> u64 {
        self.start + self.transferred()
    }

    /// Returns true once every byte up to the total has passed
    pub fn is_complete(&self) -> bool {
        self.position() >= self.total
    }

    /// Formats `"<prefix> <done>/<total> MB (<pct>%) <speed> KB/s"`
    pub fn line(&self, bytes_per_sec: u64) -> String {
        let done = self.position();
        let percent = if self.total == 0 {
            100
        } else {
            done.saturating_mul(100) / self.total
        };
        format!(
            "{} {:.2}/{:.2} MB ({}%) {} KB/s",
            self.prefix,
            done as f64 / MB,
            self.total as f64 / MB,
            percent,
            bytes_per_sec / 1024
        )
    }
}

/// Reader that reports every chunk it yields to a [`Progress`]
pub struct ProgressReader<R> {
    inner: R,
    progress: Arc<Progress>,
}

impl<R> ProgressReader<R> {
    pub fn new(inner: R, progress: Arc<Progress>) -> Self {
        Self { inner, progress }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            self.progress.add((buf.filled().len() - before) as u64);
        }
        poll
    }
}

/// Runs `transfer` until it finishes, stalls, or `cancel` fires
///
/// # Errors
/// Returns the transfer's own error, [`SyncError::Stalled`] after
/// `stall_timeout` without activity, or [`SyncError::Cancelled`].
pub async fn guard<T, F>(
    transfer: F,
    progress: &Progress,
    stall_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::pin!(transfer);

    let mut window = inactivity_window(progress, stall_timeout);
    let mut deadline = Instant::now() + window;
    let mut ticker = tokio::time::interval_at(Instant::now() + PROGRESS_INTERVAL, PROGRESS_INTERVAL);
    let mut last_bytes = progress.transferred();
    let mut last_tick = Instant::now();

    loop {
        tokio::select! {
            result = &mut transfer => return result,
            _ = cancel.cancelled() => return Err(SyncError::Cancelled.into()),
            _ = progress.activity.notified() => {
                window = inactivity_window(progress, stall_timeout);
                deadline = Instant::now() + window;
            }
            _ = tokio::time::sleep_until(deadline) => {
                return Err(SyncError::Stalled(window.as_secs()).into());
            }
            _ = ticker.tick() => {
                let bytes = progress.transferred();
                let elapsed = last_tick.elapsed().as_secs_f64().max(0.001);
                let speed = ((bytes - last_bytes) as f64 / elapsed) as u64;
                info!("{}", progress.line(speed));
                last_bytes = bytes;
                last_tick = Instant::now();
            }
        }
    }
}

fn inactivity_window(progress: &Progress, stall_timeout: Duration) -> Duration {
    if progress.is_complete() {
        stall_timeout.max(ACK_TIMEOUT)
    } else {
        stall_timeout
    }
}
