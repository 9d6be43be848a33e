//! Websocket change notifier
//!
//! Keeps a connection to the put.io socket open, authenticates with the
//! access token and turns file events into [`RemoteChange`] broadcasts.
//!
//! ## Connection lifecycle
//!
//! ```text
//! connect ──► send token ──► emit synthetic change ──► read events ─┐
//!    ▲                                                              │
//!    └──────── sleep backoff (1s doubling to 60s) ◄── error/close ──┘
//! ```
//!
//! A close frame with code 4001 means the token was rejected. The token is
//! dropped and the notifier stops reconnecting. The backoff resets after
//! every successful authentication.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use putsync_core::ports::{IChangeNotifier, RemoteChange};

/// Close code the socket uses for a rejected token
const INVALID_TOKEN_CLOSE_CODE: u16 = 4001;

/// Buffered changes per subscriber; slow subscribers only lose duplicates
const CHANNEL_CAPACITY: usize = 64;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

// ============================================================================
// Wire messages
// ============================================================================

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    value: Option<EventValue>,
}

#[derive(Debug, Deserialize)]
struct EventValue {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    name: Option<String>,
}

/// Parses a socket text frame, returning a change for file events only
pub fn parse_event(text: &str) -> Option<RemoteChange> {
    let msg: IncomingMessage = serde_json::from_str(text).ok()?;
    match msg.kind.as_str() {
        "file_create" | "file_update" | "file_delete" => {
            let value = msg.value.unwrap_or(EventValue { id: None, name: None });
            debug!(kind = %msg.kind, id = ?value.id, name = ?value.name, "Remote event received");
            Some(RemoteChange {
                file_id: value.id,
                name: value.name,
            })
        }
        _ => None,
    }
}

// ============================================================================
// Backoff
// ============================================================================

/// Exponential reconnect delay
#[derive(Debug)]
pub struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { current: initial, max }
    }

    /// Returns the delay to wait now and doubles the next one
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self, initial: Duration) {
        self.current = initial;
    }
}

// ============================================================================
// WebSocketNotifier
// ============================================================================

/// How a connection ended
enum SessionEnd {
    Shutdown,
    Closed,
    InvalidToken,
}

struct Shared {
    url: String,
    token: Mutex<Option<String>>,
    connected: AtomicBool,
    tx: broadcast::Sender<RemoteChange>,
}

impl Shared {
    fn token(&self) -> Option<String> {
        self.token.lock().ok().and_then(|t| t.clone())
    }

    fn clear_token(&self) {
        if let Ok(mut token) = self.token.lock() {
            *token = None;
        }
    }

    fn notify(&self, change: RemoteChange) {
        // No receivers simply means nobody is waiting for a pass yet.
        let _ = self.tx.send(change);
    }
}

/// Remote change notifier backed by the put.io websocket
#[derive(Clone)]
pub struct WebSocketNotifier {
    shared: Arc<Shared>,
}

impl WebSocketNotifier {
    /// Creates a notifier; nothing connects until [`WebSocketNotifier::spawn`]
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                url: url.into(),
                token: Mutex::new(Some(token.into())),
                connected: AtomicBool::new(false),
                tx,
            }),
        }
    }

    /// Returns false once the socket has rejected the token
    pub fn has_token(&self) -> bool {
        self.shared.token().is_some()
    }

    /// Runs the reconnect loop until `shutdown` fires or the token is rejected
    pub fn spawn(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { run(shared, shutdown).await })
    }
}

impl IChangeNotifier for WebSocketNotifier {
    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<RemoteChange> {
        self.shared.tx.subscribe()
    }
}

async fn run(shared: Arc<Shared>, shutdown: CancellationToken) {
    let mut backoff = Backoff::new(INITIAL_BACKOFF, MAX_BACKOFF);
    loop {
        let Some(token) = shared.token() else {
            warn!("No valid token, remote change notifications disabled");
            return;
        };

        let result = session(&shared, &token, &shutdown, &mut backoff).await;
        shared.connected.store(false, Ordering::SeqCst);

        match result {
            Ok(SessionEnd::Shutdown) => return,
            Ok(SessionEnd::InvalidToken) => {
                error!("Websocket rejected the access token");
                shared.clear_token();
                return;
            }
            Ok(SessionEnd::Closed) => info!("Websocket closed by server"),
            Err(e) => error!(error = %e, "Websocket error"),
        }

        let delay = backoff.next_delay();
        debug!(delay_ms = delay.as_millis() as u64, "Reconnecting to websocket");
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn session(
    shared: &Shared,
    token: &str,
    shutdown: &CancellationToken,
    backoff: &mut Backoff,
) -> anyhow::Result<SessionEnd> {
    debug!(url = %shared.url, "Connecting to websocket");
    let (ws, _) = tokio::time::timeout(HANDSHAKE_TIMEOUT, connect_async(shared.url.as_str()))
        .await
        .map_err(|_| anyhow::anyhow!("websocket handshake timed out"))??;
    let (mut write, mut read) = ws.split();

    write.send(Message::Text(token.to_string())).await?;

    shared.connected.store(true, Ordering::SeqCst);
    backoff.reset(INITIAL_BACKOFF);
    info!("Connected to remote change notifications");
    // Changes made while disconnected were missed.
    shared.notify(RemoteChange::unspecified());

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(SessionEnd::Shutdown);
            }
            msg = read.next() => match msg {
                None => return Ok(SessionEnd::Closed),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(Message::Text(text))) => {
                    if let Some(change) = parse_event(&text) {
                        shared.notify(change);
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.as_ref().map(|f| u16::from(f.code));
                    debug!(?code, "Websocket close frame");
                    if code == Some(INVALID_TOKEN_CLOSE_CODE) {
                        return Ok(SessionEnd::InvalidToken);
                    }
                    return Ok(SessionEnd::Closed);
                }
                Some(Ok(_)) => {}
            }
        }
    }
}
