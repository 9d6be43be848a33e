//! Integration tests for the websocket change notifier
//!
//! A local websocket server stands in for the put.io socket.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use putsync_core::ports::{IChangeNotifier, RemoteChange};
use putsync_remote::WebSocketNotifier;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/socket", listener.local_addr().unwrap());
    (listener, url)
}

#[tokio::test]
async fn test_sends_token_and_forwards_file_events() {
    let (listener, url) = listen().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let first = ws.next().await.unwrap().unwrap();
        ws.send(Message::Text(
            r#"{"type":"file_update","value":{"id":42,"name":"a.txt"}}"#.to_string(),
        ))
        .await
        .unwrap();
        // Keep the connection open until the client goes away.
        while ws.next().await.is_some() {}
        first
    });

    let notifier = WebSocketNotifier::new(url, "secret-token");
    let mut changes = notifier.subscribe();
    let shutdown = CancellationToken::new();
    let handle = notifier.spawn(shutdown.clone());

    let connected = tokio::time::timeout(WAIT, changes.recv()).await.unwrap().unwrap();
    assert_eq!(connected, RemoteChange::unspecified());
    assert!(notifier.is_connected());

    let change = tokio::time::timeout(WAIT, changes.recv()).await.unwrap().unwrap();
    assert_eq!(change.file_id, Some(42));
    assert_eq!(change.name.as_deref(), Some("a.txt"));

    shutdown.cancel();
    tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
    assert!(!notifier.is_connected());

    let first = server.await.unwrap();
    assert_eq!(first, Message::Text("secret-token".to_string()));
}

#[tokio::test]
async fn test_invalid_token_close_stops_reconnecting() {
    let (listener, url) = listen().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let _token = ws.next().await;
        ws.close(Some(CloseFrame {
            code: CloseCode::from(4001),
            reason: "invalid token".into(),
        }))
        .await
        .unwrap();
        while ws.next().await.is_some() {}
    });

    let notifier = WebSocketNotifier::new(url, "bad-token");
    let handle = notifier.spawn(CancellationToken::new());

    tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
    assert!(!notifier.has_token());
    assert!(!notifier.is_connected());
}
