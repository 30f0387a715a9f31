use crate::core::config::ClientConfig;
use crate::core::connection_state::{AtomicConnectionPhase, AtomicMetrics, ConnectionPhase};
use crate::core::correlation::Completion;
use crate::core::machine::ConnectionStateMachine;
use crate::core::message::{CorrelationId, DisconnectInfo, ServerMessage};
use crate::traits::*;
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, info};

type Reply = oneshot::Sender<Result<ServerMessage>>;

/// Internal command messages for client control
enum ClientCommand {
    Connect(Reply),
    Disconnect,
    Subscribe {
        channel: String,
        observer: Arc<dyn ChannelObserver>,
        reply: Reply,
    },
    Unsubscribe {
        channel: String,
        reply: Reply,
    },
    Publish {
        channel: String,
        data: Value,
        reply: Reply,
    },
    Presence {
        channel: String,
        reply: Reply,
    },
    History {
        channel: String,
        reply: Reply,
    },
    Ping(Reply),
    /// A request outlived the configured timeout
    Expire(CorrelationId),
    /// A connect attempt outlived the configured timeout
    ExpireHandshake(u64),
    /// Get the currently subscribed channels
    GetSubscriptions(oneshot::Sender<Vec<String>>),
    /// Shutdown the client
    Shutdown,
}

/// Connection-level event from the client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Handshake completed
    Connected,
    /// Connection is gone
    Disconnected(DisconnectInfo),
    /// Server asked for fresh credentials
    ForcedRefresh,
    /// Error occurred
    Error(String),
}

/// Client metrics snapshot
#[derive(Debug, Clone)]
pub struct Metrics {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub protocol_violations: u64,
    pub phase: ConnectionPhase,
}

/// Async pub/sub client
///
/// A dedicated tokio task owns the [`ConnectionStateMachine`]; this handle
/// talks to it over a command channel, so every protocol mutation happens
/// on one task in arrival order. Observer and delegate callbacks run on
/// that task too.
///
/// Connection-level events are also mirrored onto an unbounded crossbeam
/// channel for polling with [`try_recv_event`](Self::try_recv_event).
pub struct PubSubClient {
    /// Command channel sender
    command_tx: UnboundedSender<ClientCommand>,
    /// Event channel receiver
    event_rx: Receiver<ClientEvent>,
    /// Lock-free phase mirror
    phase: Arc<AtomicConnectionPhase>,
    /// Atomic metrics
    metrics: Arc<AtomicMetrics>,
    /// Main task handle
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl PubSubClient {
    /// Create a client from configuration
    ///
    /// This is called by the builder's `build()` method.
    /// Use `pubsockets::builder()` to create a client.
    pub(crate) fn new(mut config: ClientConfig) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PubSubError::Configuration(format!("no tokio runtime: {}", e)))?;

        let (event_tx, event_rx) = unbounded();
        config.delegate = Arc::new(EventForwarder {
            inner: Arc::clone(&config.delegate),
            events: event_tx.clone(),
        });
        let request_timeout = config.request_timeout;

        let machine = ConnectionStateMachine::new(config);
        let phase = machine.shared_phase();
        let metrics = machine.shared_metrics();

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let actor = ClientActor {
            machine,
            command_rx,
            expiry_tx: command_tx.downgrade(),
            event_tx,
            request_timeout,
        };

        let task_handle = runtime.spawn(actor.run());

        Ok(Self {
            command_tx,
            event_rx,
            phase,
            metrics,
            task_handle: Some(task_handle),
        })
    }

    /// Connect and perform the handshake
    ///
    /// Resolves with the server's handshake reply. Fails with
    /// `CallerMisuse` if already connected or connecting.
    pub async fn connect(&self) -> Result<ServerMessage> {
        self.request(ClientCommand::Connect).await
    }

    /// Subscribe `observer` to `channel`
    pub async fn subscribe(
        &self,
        channel: impl Into<String>,
        observer: Arc<dyn ChannelObserver>,
    ) -> Result<ServerMessage> {
        let channel = channel.into();
        self.request(move |reply| ClientCommand::Subscribe {
            channel,
            observer,
            reply,
        })
        .await
    }

    /// Ask the server to end the subscription to `channel`
    ///
    /// Resolves on the server's reply. The observer keeps receiving events
    /// until the server's `Unsubscribe` event for the channel arrives.
    pub async fn unsubscribe(&self, channel: impl Into<String>) -> Result<ServerMessage> {
        let channel = channel.into();
        self.request(move |reply| ClientCommand::Unsubscribe { channel, reply })
            .await
    }

    pub async fn publish(&self, channel: impl Into<String>, data: Value) -> Result<ServerMessage> {
        let channel = channel.into();
        self.request(move |reply| ClientCommand::Publish {
            channel,
            data,
            reply,
        })
        .await
    }

    pub async fn presence(&self, channel: impl Into<String>) -> Result<ServerMessage> {
        let channel = channel.into();
        self.request(move |reply| ClientCommand::Presence { channel, reply })
            .await
    }

    pub async fn history(&self, channel: impl Into<String>) -> Result<ServerMessage> {
        let channel = channel.into();
        self.request(move |reply| ClientCommand::History { channel, reply })
            .await
    }

    pub async fn ping(&self) -> Result<ServerMessage> {
        self.request(ClientCommand::Ping).await
    }

    /// Close the connection; the client can connect again afterwards
    pub fn disconnect(&self) -> Result<()> {
        self.command_tx
            .send(ClientCommand::Disconnect)
            .map_err(|e| PubSubError::ChannelSend(e.to_string()))
    }

    /// Channels with an active or pending subscription
    pub async fn subscriptions(&self) -> Result<Vec<String>> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(ClientCommand::GetSubscriptions(tx))
            .map_err(|e| PubSubError::ChannelSend(e.to_string()))?;
        rx.await
            .map_err(|_| PubSubError::ConnectionClosed("client task stopped".into()))
    }

    /// Get current connection phase
    #[inline]
    pub fn phase(&self) -> ConnectionPhase {
        self.phase.get()
    }

    /// Check if connected
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.phase.is_connected()
    }

    /// Get current metrics
    pub fn metrics(&self) -> Metrics {
        Metrics {
            frames_sent: self.metrics.frames_sent(),
            frames_received: self.metrics.frames_received(),
            protocol_violations: self.metrics.protocol_violations(),
            phase: self.phase.get(),
        }
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv_event(&self) -> Option<ClientEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Receive an event (blocking)
    pub fn recv_event(&self) -> std::result::Result<ClientEvent, crossbeam_channel::RecvError> {
        self.event_rx.recv()
    }

    /// Disconnect and stop the client task
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Shutting down pub/sub client");

        let _ = self.command_tx.send(ClientCommand::Shutdown);

        if let Some(handle) = self.task_handle.take() {
            handle
                .await
                .map_err(|e| PubSubError::Other(format!("client task failed: {}", e)))?;
        }

        Ok(())
    }

    async fn request<F>(&self, make: F) -> Result<ServerMessage>
    where
        F: FnOnce(Reply) -> ClientCommand,
    {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(make(tx))
            .map_err(|e| PubSubError::ChannelSend(e.to_string()))?;

        rx.await
            .map_err(|_| PubSubError::ConnectionClosed("client task stopped".into()))?
    }
}

/// Wraps the user's delegate and mirrors notifications as [`ClientEvent`]s
struct EventForwarder {
    inner: Arc<dyn ConnectionDelegate>,
    events: Sender<ClientEvent>,
}

impl ConnectionDelegate for EventForwarder {
    fn on_error(&self, error: &PubSubError) {
        let _ = self.events.send(ClientEvent::Error(error.to_string()));
        self.inner.on_error(error);
    }

    fn on_forced_refresh(&self) {
        let _ = self.events.send(ClientEvent::ForcedRefresh);
        self.inner.on_forced_refresh();
    }

    fn on_disconnect(&self, info: &DisconnectInfo) {
        let _ = self.events.send(ClientEvent::Disconnected(info.clone()));
        self.inner.on_disconnect(info);
    }
}

/// The task owning the state machine
struct ClientActor {
    machine: ConnectionStateMachine,
    command_rx: UnboundedReceiver<ClientCommand>,
    /// Weak so pending timers do not keep the task alive after the handle is dropped
    expiry_tx: WeakUnboundedSender<ClientCommand>,
    event_tx: Sender<ClientEvent>,
    request_timeout: Option<Duration>,
}

impl ClientActor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(ClientCommand::Shutdown) | None => {
                            self.machine.disconnect();
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd),
                    }
                }

                event = self.machine.next_transport_event() => {
                    self.machine.handle_transport_event(event);
                }
            }
        }

        info!("Client task exiting");
    }

    fn handle_command(&mut self, cmd: ClientCommand) {
        let id = match cmd {
            ClientCommand::Connect(reply) => {
                let events = self.event_tx.clone();
                let attempt = self.machine.connect(Box::new(move |result: Result<ServerMessage>| {
                    if result.is_ok() {
                        let _ = events.send(ClientEvent::Connected);
                    }
                    let _ = reply.send(result);
                }));
                if let (Some(attempt), Some(timeout)) = (attempt, self.request_timeout) {
                    self.schedule(ClientCommand::ExpireHandshake(attempt), timeout);
                }
                None
            }
            ClientCommand::Disconnect => {
                self.machine.disconnect();
                None
            }
            ClientCommand::Subscribe {
                channel,
                observer,
                reply,
            } => self.machine.subscribe(&channel, observer, completion(reply)),
            ClientCommand::Unsubscribe { channel, reply } => {
                self.machine.unsubscribe(&channel, completion(reply))
            }
            ClientCommand::Publish {
                channel,
                data,
                reply,
            } => self.machine.publish(&channel, data, completion(reply)),
            ClientCommand::Presence { channel, reply } => {
                self.machine.presence(&channel, completion(reply))
            }
            ClientCommand::History { channel, reply } => {
                self.machine.history(&channel, completion(reply))
            }
            ClientCommand::Ping(reply) => self.machine.ping(completion(reply)),
            ClientCommand::Expire(id) => {
                let error = PubSubError::Timeout(format!("no reply to request {}", id));
                if self.machine.fail_request(&id, error) {
                    debug!("Request {} timed out", id);
                }
                None
            }
            ClientCommand::ExpireHandshake(attempt) => {
                if self.machine.expire_handshake(attempt) {
                    debug!("Connect attempt {} timed out", attempt);
                }
                None
            }
            ClientCommand::GetSubscriptions(reply) => {
                let _ = reply.send(self.machine.subscribed_channels());
                None
            }
            ClientCommand::Shutdown => None,
        };

        if let (Some(id), Some(timeout)) = (id, self.request_timeout) {
            self.schedule(ClientCommand::Expire(id), timeout);
        }
    }

    /// Deliver `cmd` to this task after `delay`
    fn schedule(&self, cmd: ClientCommand, delay: Duration) {
        let expiry_tx = self.expiry_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = expiry_tx.upgrade() {
                let _ = tx.send(cmd);
            }
        });
    }
}

fn completion(reply: Reply) -> Completion {
    Box::new(move |result| {
        let _ = reply.send(result);
    })
}
