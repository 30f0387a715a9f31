//! WebSocket transport
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  send(frame)   ┌──────────────────────────┐
//! │ State machine    │ ─────────────► │ Stream task (tokio)      │ ──► WebSocket
//! │ (client task)    │  unbounded mpsc│  connect, then select!   │
//! │                  │ ◄───────────── │  over read half/outbound │ ◄── WebSocket
//! └──────────────────┘ TransportEvent └──────────────────────────┘
//! ```
//!
//! `send` never waits on the network. Closing drops the outbound sender;
//! the stream task then sends a close frame and exits.

use crate::traits::{PubSubError, Result, Transport, TransportEvent, TransportEventSender};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Close code reported when the peer closes without a status code
const NO_STATUS_CODE: u16 = 1005;

/// Close code reported when the stream ends without a close frame
const ABNORMAL_CODE: u16 = 1006;

/// Transport over a tokio-tungstenite WebSocket
#[derive(Debug)]
pub struct WebSocketTransport {
    url: String,
    outbound: Option<UnboundedSender<Message>>,
}

impl WebSocketTransport {
    /// Create a transport for `url`, which must be ws:// or wss://
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(PubSubError::Configuration(format!(
                "WebSocket URL must start with ws:// or wss://, got '{}'",
                url
            )));
        }
        Ok(Self {
            url,
            outbound: None,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for WebSocketTransport {
    fn open(&mut self, events: TransportEventSender) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PubSubError::TransportFailure(format!("no tokio runtime: {}", e)))?;

        if self.outbound.take().is_some() {
            debug!("Replacing previous stream for {}", self.url);
        }

        let (outbound_tx, outbound_rx) = unbounded_channel();
        self.outbound = Some(outbound_tx);

        let url = self.url.clone();
        runtime.spawn(async move {
            run_stream(url, outbound_rx, events).await;
        });
        Ok(())
    }

    fn send(&mut self, frame: String) -> Result<()> {
        let outbound = self
            .outbound
            .as_ref()
            .ok_or_else(|| PubSubError::TransportFailure("transport is not open".into()))?;

        outbound
            .send(Message::Text(frame))
            .map_err(|_| PubSubError::TransportFailure("stream task has stopped".into()))
    }

    fn close(&mut self) {
        if self.outbound.take().is_some() {
            debug!("Closing stream to {}", self.url);
        }
    }
}

/// Stream task: connect, then pump frames both ways until either side ends
async fn run_stream(
    url: String,
    mut outbound: UnboundedReceiver<Message>,
    events: TransportEventSender,
) {
    let ws_stream = match connect_async(url.as_str()).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            error!("Failed to connect to {}: {}", url, e);
            let _ = events.send(TransportEvent::Error(e.to_string()));
            return;
        }
    };

    info!("Connected to {}", url);
    if events.send(TransportEvent::Opened).is_err() {
        debug!("Connection owner is gone, dropping stream");
        return;
    }

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => {
                let event = match msg {
                    Some(Ok(Message::Text(text))) => TransportEvent::Text(text),
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => TransportEvent::Text(text),
                        Err(_) => {
                            warn!("Dropping non UTF-8 binary frame");
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.to_string()))
                            .unwrap_or((NO_STATUS_CODE, String::new()));
                        let _ = events.send(TransportEvent::Closed { code, reason, clean: true });
                        return;
                    }
                    // Pings are answered by tungstenite itself
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        let _ = events.send(TransportEvent::Error(e.to_string()));
                        return;
                    }
                    None => {
                        let _ = events.send(TransportEvent::Closed {
                            code: ABNORMAL_CODE,
                            reason: "stream ended".to_string(),
                            clean: false,
                        });
                        return;
                    }
                };

                if events.send(event).is_err() {
                    debug!("Connection owner is gone, closing stream");
                    let _ = write.close().await;
                    return;
                }
            }

            out = outbound.recv() => {
                match out {
                    Some(msg) => {
                        if let Err(e) = write.send(msg).await {
                            warn!("Failed to send frame: {}", e);
                            let _ = events.send(TransportEvent::Error(e.to_string()));
                            return;
                        }
                    }
                    None => {
                        debug!("Outbound closed, sending close frame");
                        let _ = write.close().await;
                        return;
                    }
                }
            }
        }
    }
}
