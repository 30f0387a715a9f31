//! Common test utilities for PubSockets integration tests
//!
//! This module provides an in-memory transport, recording observers, and a
//! mock pub/sub server speaking the JSON protocol over a real WebSocket.

#![allow(dead_code)]

use parking_lot::Mutex;
use pubsockets::*;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

// =============================================================================
// In-memory transport
// =============================================================================

/// What the recording transport has seen
#[derive(Default)]
pub struct TransportLog {
    pub opened: usize,
    pub closed: usize,
    pub sent: Vec<String>,
    pub fail_open: bool,
    pub fail_send: bool,
}

/// Transport that records frames instead of sending them
///
/// Clones share one log, so a test keeps a clone to inspect what the
/// state machine did with the one it owns.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    log: Arc<Mutex<TransportLog>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<String> {
        self.log.lock().sent.clone()
    }

    /// Sent frames decoded as JSON
    pub fn sent_json(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .map(|frame| serde_json::from_str(frame).unwrap())
            .collect()
    }

    pub fn last_sent(&self) -> Value {
        self.sent_json().pop().expect("nothing sent")
    }

    pub fn opened(&self) -> usize {
        self.log.lock().opened
    }

    pub fn closed(&self) -> usize {
        self.log.lock().closed
    }

    pub fn fail_open(&self) {
        self.log.lock().fail_open = true;
    }

    pub fn fail_send(&self) {
        self.log.lock().fail_send = true;
    }
}

impl Transport for RecordingTransport {
    fn open(&mut self, _events: TransportEventSender) -> Result<()> {
        let mut log = self.log.lock();
        if log.fail_open {
            return Err(PubSubError::TransportFailure("refused".into()));
        }
        log.opened += 1;
        Ok(())
    }

    fn send(&mut self, frame: String) -> Result<()> {
        let mut log = self.log.lock();
        if log.fail_send {
            return Err(PubSubError::TransportFailure("send failed".into()));
        }
        log.sent.push(frame);
        Ok(())
    }

    fn close(&mut self) {
        self.log.lock().closed += 1;
    }
}

// =============================================================================
// Recorders
// =============================================================================

/// One event seen by an observer
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedEvent {
    pub channel: String,
    pub method: Method,
    pub data: Option<Value>,
}

#[derive(Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl CollectingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().clone()
    }

    pub fn methods(&self) -> Vec<Method> {
        self.events.lock().iter().map(|e| e.method.clone()).collect()
    }

    fn record(&self, channel: &str, message: &ServerMessage) {
        self.events.lock().push(ObservedEvent {
            channel: channel.to_string(),
            method: message.method.clone(),
            data: message.data().cloned(),
        });
    }
}

impl ChannelObserver for CollectingObserver {
    fn on_message(&self, channel: &str, message: &ServerMessage) {
        self.record(channel, message);
    }

    fn on_join(&self, channel: &str, message: &ServerMessage) {
        self.record(channel, message);
    }

    fn on_leave(&self, channel: &str, message: &ServerMessage) {
        self.record(channel, message);
    }

    fn on_unsubscribe(&self, channel: &str, message: &ServerMessage) {
        self.record(channel, message);
    }
}

#[derive(Default)]
pub struct CollectingDelegate {
    pub errors: Mutex<Vec<PubSubError>>,
    pub refreshes: Mutex<usize>,
    pub disconnects: Mutex<Vec<DisconnectInfo>>,
}

impl CollectingDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn errors(&self) -> Vec<PubSubError> {
        self.errors.lock().clone()
    }

    pub fn refreshes(&self) -> usize {
        *self.refreshes.lock()
    }

    pub fn disconnects(&self) -> Vec<DisconnectInfo> {
        self.disconnects.lock().clone()
    }
}

impl ConnectionDelegate for CollectingDelegate {
    fn on_error(&self, error: &PubSubError) {
        self.errors.lock().push(error.clone());
    }

    fn on_forced_refresh(&self) {
        *self.refreshes.lock() += 1;
    }

    fn on_disconnect(&self, info: &DisconnectInfo) {
        self.disconnects.lock().push(info.clone());
    }
}

/// Slot a completion writes its result into
pub type Outcome = Arc<Mutex<Option<Result<ServerMessage>>>>;

/// A completion plus the slot it fills
pub fn capture() -> (Completion, Outcome) {
    let slot: Outcome = Arc::new(Mutex::new(None));
    let writer = Arc::clone(&slot);
    let completion: Completion = Box::new(move |result| {
        let previous = writer.lock().replace(result);
        assert!(previous.is_none(), "completion invoked twice");
    });
    (completion, slot)
}

pub fn test_credentials() -> Credentials {
    Credentials::new("42", "1700000000", "secret")
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// =============================================================================
// Mock server
// =============================================================================

/// A mock pub/sub server for testing
///
/// Replies to every request on the same connection. Special channels:
/// - `silent`: requests get no reply
/// - `kick`: a publish is answered with a server disconnect push
/// - `refresh`: a publish is answered with a refresh push
///
/// A connect from user `rejected` is answered with an error, and one from
/// user `mute` is never answered.
pub struct MockPubSubServer {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<Value>>>,
    shutdown: Arc<Notify>,
}

impl MockPubSubServer {
    /// Create and start a new mock server
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let received = Arc::new(Mutex::new(Vec::new()));

        let shutdown_clone = shutdown.clone();
        let received_clone = received.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let shutdown = shutdown_clone.clone();
                                let received = received_clone.clone();
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, received, shutdown).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_clone.notified() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            received,
            shutdown,
        }
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        received: Arc<Mutex<Vec<Value>>>,
        shutdown: Arc<Notify>,
    ) {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::{accept_async, tungstenite::Message};

        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => continue,
                    };

                    let request: Value = match serde_json::from_str(&text) {
                        Ok(value) => value,
                        Err(_) => continue,
                    };
                    received.lock().push(request.clone());

                    let (frames, close) = Self::respond(&request);
                    for frame in frames {
                        if write.send(Message::Text(frame.to_string())).await.is_err() {
                            return;
                        }
                    }
                    if close {
                        let _ = write.close().await;
                        return;
                    }
                }
                _ = shutdown.notified() => {
                    break;
                }
            }
        }
    }

    /// Frames to send back for one request, and whether to close afterwards
    fn respond(request: &Value) -> (Vec<Value>, bool) {
        let uid = request["uid"].clone();
        let method = request["method"].as_str().unwrap_or_default();
        let params = &request["params"];
        let channel = params["channel"].as_str().unwrap_or_default();

        if channel == "silent" {
            return (Vec::new(), false);
        }

        match method {
            "connect" if params["user"] == "mute" => (Vec::new(), false),
            "connect" if params["user"] == "rejected" => (
                vec![json!({"uid": uid, "method": "connect", "error": "invalid token"})],
                false,
            ),
            "connect" => (
                vec![json!({"uid": uid, "method": "connect", "body": {"client": "mock-client", "version": "1.0"}})],
                false,
            ),
            "subscribe" => (
                vec![json!({"uid": uid, "method": "subscribe", "body": {"channel": channel}})],
                false,
            ),
            "unsubscribe" => (
                vec![json!([
                    {"uid": uid, "method": "unsubscribe", "body": {"channel": channel}},
                    {"method": "unsubscribe", "body": {"channel": channel}}
                ])],
                false,
            ),
            "publish" if channel == "kick" => (
                vec![json!({"method": "disconnect", "body": {"reason": "kicked", "code": 4000}})],
                true,
            ),
            "publish" if channel == "refresh" => (
                vec![
                    json!({"uid": uid, "method": "publish", "body": {}}),
                    json!({"method": "refresh", "body": {}}),
                ],
                false,
            ),
            "publish" => (
                vec![json!([
                    {"uid": uid, "method": "publish", "body": {}},
                    {"method": "message", "body": {"channel": channel, "data": params["data"]}}
                ])],
                false,
            ),
            "presence" => (
                vec![json!({"uid": uid, "method": "presence", "body": {"channel": channel, "data": {"42": {"user": "42"}}}})],
                false,
            ),
            "history" => (
                vec![json!({"uid": uid, "method": "history", "body": {"channel": channel, "data": []}})],
                false,
            ),
            "ping" => (vec![json!({"uid": uid, "method": "ping"})], false),
            _ => (Vec::new(), false),
        }
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Requests received so far, across connections
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().clone()
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockPubSubServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
