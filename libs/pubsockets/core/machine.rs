//! Connection state machine
//!
//! # Phases
//!
//! ```text
//!                connect()                 first batch ok
//! Disconnected ───────────► Handshaking ───────────────────► Connected
//!      ▲                        │                                │
//!      │  bad/missing reply,    │                                │ closed, error,
//!      │  server error, close,  │                                │ server disconnect,
//!      └────────────────────────┴────────────────────────────────┘ disconnect()
//! ```
//!
//! The active [`DispatchMode`] decides how an incoming batch is read. It is
//! swapped on every transition, never layered, and the phase is derived
//! from it, so there is no way to be connected without a mode.
//!
//! Every transition back to `Disconnected` closes the transport, fails all
//! pending calls with `ConnectionClosed`, and clears the subscriptions.
//!
//! The machine performs no I/O of its own and is not thread-safe; one
//! task owns it and feeds it transport events and caller requests in
//! order.

use crate::core::config::ClientConfig;
use crate::core::connection_state::{AtomicConnectionPhase, AtomicMetrics, ConnectionPhase};
use crate::core::correlation::{Completion, CorrelationTable, PendingCall};
use crate::core::dispatcher::{DispatchOutcome, Dispatcher};
use crate::core::message::{
    ClientMessage, CorrelationId, Credentials, DisconnectInfo, Intent, Method, ServerMessage,
};
use crate::core::subscriptions::SubscriptionRegistry;
use crate::traits::*;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{debug, info, warn};

/// Close code used when the client ends the connection itself
pub const CLIENT_DISCONNECT_CODE: u16 = 1000;

/// Close code used when the transport fails without a close frame
pub const ABNORMAL_CLOSE_CODE: u16 = 1006;

/// How incoming batches are interpreted
pub enum DispatchMode {
    /// Nothing is expected; batches are ignored
    Disconnected,
    /// The first message of the next batch must answer the handshake
    Handshaking {
        /// Number of the connect call that started this handshake
        attempt: u64,
        /// Set once the handshake frame has been sent
        handshake_id: Option<CorrelationId>,
        completion: Completion,
    },
    /// Every message goes through the dispatcher
    Connected,
}

impl DispatchMode {
    pub fn phase(&self) -> ConnectionPhase {
        match self {
            DispatchMode::Disconnected => ConnectionPhase::Disconnected,
            DispatchMode::Handshaking { .. } => ConnectionPhase::Handshaking,
            DispatchMode::Connected => ConnectionPhase::Connected,
        }
    }
}

impl std::fmt::Debug for DispatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchMode::Disconnected => f.write_str("Disconnected"),
            DispatchMode::Handshaking {
                attempt,
                handshake_id,
                ..
            } => f
                .debug_struct("Handshaking")
                .field("attempt", attempt)
                .field("handshake_id", handshake_id)
                .finish_non_exhaustive(),
            DispatchMode::Connected => f.write_str("Connected"),
        }
    }
}

/// Protocol state for a single connection
pub struct ConnectionStateMachine {
    mode: DispatchMode,
    credentials: Credentials,
    transport: Box<dyn Transport>,
    codec: Box<dyn MessageCodec>,
    message_builder: Box<dyn MessageBuilder>,
    delegate: Arc<dyn ConnectionDelegate>,
    calls: CorrelationTable,
    subscriptions: SubscriptionRegistry,
    transport_events: Option<UnboundedReceiver<TransportEvent>>,
    connect_attempts: u64,
    phase: Arc<AtomicConnectionPhase>,
    metrics: Arc<AtomicMetrics>,
}

impl ConnectionStateMachine {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            mode: DispatchMode::Disconnected,
            credentials: config.credentials,
            transport: config.transport,
            codec: config.codec,
            message_builder: config.message_builder,
            delegate: config.delegate,
            calls: CorrelationTable::new(),
            subscriptions: SubscriptionRegistry::new(),
            transport_events: None,
            connect_attempts: 0,
            phase: Arc::new(AtomicConnectionPhase::default()),
            metrics: Arc::new(AtomicMetrics::new()),
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    #[inline]
    pub fn phase(&self) -> ConnectionPhase {
        self.mode.phase()
    }

    pub fn mode(&self) -> &DispatchMode {
        &self.mode
    }

    /// Shared view of the phase for lock-free readers
    pub fn shared_phase(&self) -> Arc<AtomicConnectionPhase> {
        Arc::clone(&self.phase)
    }

    pub fn shared_metrics(&self) -> Arc<AtomicMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn pending_calls(&self) -> usize {
        self.calls.len()
    }

    pub fn is_pending(&self, id: &CorrelationId) -> bool {
        self.calls.contains(id)
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.subscriptions.contains(channel)
    }

    pub fn subscribed_channels(&self) -> Vec<String> {
        self.subscriptions.channels()
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    /// Start connecting
    ///
    /// Rejected with `CallerMisuse` unless currently disconnected.
    ///
    /// Returns the attempt number while the handshake is in progress, for
    /// use with [`expire_handshake`](Self::expire_handshake).
    pub fn connect(&mut self, completion: Completion) -> Option<u64> {
        if !matches!(self.mode, DispatchMode::Disconnected) {
            completion(Err(PubSubError::CallerMisuse(format!(
                "connect called while {}",
                self.phase()
            ))));
            return None;
        }

        self.connect_attempts += 1;
        let attempt = self.connect_attempts;

        let (events_tx, events_rx) = unbounded_channel();
        self.transport_events = Some(events_rx);
        self.set_mode(DispatchMode::Handshaking {
            attempt,
            handshake_id: None,
            completion,
        });
        info!("Opening transport for user '{}'", self.credentials.user);

        if let Err(e) = self.transport.open(events_tx) {
            warn!("Transport failed to open: {}", e);
            self.fail_connection(e, DisconnectInfo::new(ABNORMAL_CLOSE_CODE, "open failed", false), false);
            return None;
        }
        Some(attempt)
    }

    /// Give up on handshake `attempt` if it is still in progress
    ///
    /// Fails the connect with `Timeout` and tears the transport down.
    /// Returns `false` if that handshake already finished or failed.
    pub fn expire_handshake(&mut self, attempt: u64) -> bool {
        let current = match &self.mode {
            DispatchMode::Handshaking { attempt: current, .. } => *current,
            _ => return false,
        };
        if current != attempt {
            return false;
        }

        self.fail_handshake(PubSubError::Timeout(format!(
            "no handshake reply for connect attempt {}",
            attempt
        )));
        true
    }

    /// Close the connection from the client side
    pub fn disconnect(&mut self) {
        match self.take_mode() {
            DispatchMode::Disconnected => {
                debug!("Disconnect requested while already disconnected");
                return;
            }
            DispatchMode::Handshaking { completion, .. } => {
                completion(Err(PubSubError::ConnectionClosed(
                    "disconnected during handshake".to_string(),
                )));
            }
            DispatchMode::Connected => {}
        }

        info!("Disconnecting");
        self.delegate.on_disconnect(&DisconnectInfo::new(
            CLIENT_DISCONNECT_CODE,
            "client disconnect",
            true,
        ));
        self.teardown("client disconnected");
    }

    /// Feed one transport event
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.on_opened(),
            TransportEvent::Text(frame) => self.on_text(&frame),
            TransportEvent::Closed {
                code,
                reason,
                clean,
            } => self.on_closed(code, reason, clean),
            TransportEvent::Error(error) => self.on_transport_error(error),
        }
    }

    /// Wait for the next event of the current transport
    ///
    /// Never resolves while no transport is open. Events of a transport
    /// that has since been closed are never returned.
    pub async fn next_transport_event(&mut self) -> TransportEvent {
        loop {
            let event = match self.transport_events.as_mut() {
                Some(rx) => rx.recv().await,
                None => std::future::pending::<Option<TransportEvent>>().await,
            };

            match event {
                Some(event) => return event,
                None => {
                    debug!("Transport event stream ended");
                    self.transport_events = None;
                }
            }
        }
    }

    /// The transport reports the stream is open; send the handshake
    pub fn on_opened(&mut self) {
        let handshake = match &mut self.mode {
            DispatchMode::Handshaking { handshake_id, .. } if handshake_id.is_none() => {
                let message = self.message_builder.build_handshake(&self.credentials);
                *handshake_id = Some(message.correlation_id.clone());
                message
            }
            other => {
                debug!("Ignoring transport open while {:?}", other);
                return;
            }
        };

        debug!("Transport open, sending handshake {}", handshake.correlation_id);
        if let Err(e) = self.send_message(&handshake) {
            warn!("Failed to send handshake: {}", e);
            self.fail_connection(e, DisconnectInfo::new(ABNORMAL_CLOSE_CODE, "handshake send failed", false), false);
        }
    }

    /// A raw text frame arrived
    pub fn on_text(&mut self, frame: &str) {
        self.metrics.increment_received();

        if matches!(self.mode, DispatchMode::Disconnected) {
            debug!("Dropping frame received while disconnected");
            return;
        }

        match self.codec.parse(frame) {
            Ok(batch) => self.on_batch(batch),
            Err(e) => {
                warn!("Undecodable frame: {}", e);
                if matches!(self.mode, DispatchMode::Handshaking { .. }) {
                    self.fail_handshake(e);
                } else {
                    self.report_violation(e);
                }
            }
        }
    }

    /// A decoded batch arrived
    pub fn on_batch(&mut self, batch: Vec<ServerMessage>) {
        match self.mode {
            DispatchMode::Disconnected => {
                debug!("Dropping batch of {} received while disconnected", batch.len());
            }
            DispatchMode::Handshaking { .. } => self.complete_handshake(batch),
            DispatchMode::Connected => {
                let total = batch.len();
                for (index, message) in batch.into_iter().enumerate() {
                    let outcome = Dispatcher::new(&mut self.calls, &mut self.subscriptions)
                        .handle(&message);
                    self.apply_outcome(outcome);

                    if !matches!(self.mode, DispatchMode::Connected) {
                        if index + 1 < total {
                            debug!("Dropping {} messages after disconnect", total - index - 1);
                        }
                        break;
                    }
                }
            }
        }
    }

    /// The transport closed
    pub fn on_closed(&mut self, code: u16, reason: String, clean: bool) {
        info!("Transport closed: code={} reason='{}' clean={}", code, reason, clean);
        let info = DisconnectInfo::new(code, reason.clone(), clean);
        self.fail_connection(PubSubError::Transport { code, reason }, info, false);
    }

    /// The transport failed
    pub fn on_transport_error(&mut self, error: String) {
        warn!("Transport error: {}", error);
        let info = DisconnectInfo::new(ABNORMAL_CLOSE_CODE, error.clone(), false);
        self.fail_connection(PubSubError::TransportFailure(error), info, true);
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Subscribe to `channel`
    ///
    /// The observer is registered before the request is sent, so events
    /// racing ahead of the reply still reach it.
    pub fn subscribe(
        &mut self,
        channel: &str,
        observer: Arc<dyn ChannelObserver>,
        completion: Completion,
    ) -> Option<CorrelationId> {
        if let Err(e) = self.check_request("subscribe", Some(channel)) {
            completion(Err(e));
            return None;
        }

        let message = self.message_builder.build_subscribe(channel);
        self.subscriptions.insert(channel, observer);
        self.send_request(
            message,
            Intent::Subscribe {
                channel: channel.to_string(),
            },
            completion,
        )
    }

    /// Unsubscribe from `channel`
    ///
    /// The subscription stays until the server's `Unsubscribe` event for
    /// the channel is processed; the reply alone does not remove it.
    pub fn unsubscribe(&mut self, channel: &str, completion: Completion) -> Option<CorrelationId> {
        if let Err(e) = self.check_request("unsubscribe", Some(channel)) {
            completion(Err(e));
            return None;
        }
        if !self.subscriptions.contains(channel) {
            completion(Err(PubSubError::CallerMisuse(format!(
                "not subscribed to '{}'",
                channel
            ))));
            return None;
        }

        let message = self.message_builder.build_unsubscribe(channel);
        self.send_request(
            message,
            Intent::Unsubscribe {
                channel: channel.to_string(),
            },
            completion,
        )
    }

    pub fn publish(&mut self, channel: &str, data: Value, completion: Completion) -> Option<CorrelationId> {
        if let Err(e) = self.check_request("publish", Some(channel)) {
            completion(Err(e));
            return None;
        }

        let message = self.message_builder.build_publish(channel, data);
        self.send_request(
            message,
            Intent::Publish {
                channel: channel.to_string(),
            },
            completion,
        )
    }

    pub fn presence(&mut self, channel: &str, completion: Completion) -> Option<CorrelationId> {
        if let Err(e) = self.check_request("presence", Some(channel)) {
            completion(Err(e));
            return None;
        }

        let message = self.message_builder.build_presence(channel);
        self.send_request(
            message,
            Intent::Presence {
                channel: channel.to_string(),
            },
            completion,
        )
    }

    pub fn history(&mut self, channel: &str, completion: Completion) -> Option<CorrelationId> {
        if let Err(e) = self.check_request("history", Some(channel)) {
            completion(Err(e));
            return None;
        }

        let message = self.message_builder.build_history(channel);
        self.send_request(
            message,
            Intent::History {
                channel: channel.to_string(),
            },
            completion,
        )
    }

    pub fn ping(&mut self, completion: Completion) -> Option<CorrelationId> {
        if let Err(e) = self.check_request("ping", None) {
            completion(Err(e));
            return None;
        }

        let message = self.message_builder.build_ping();
        self.send_request(message, Intent::Ping, completion)
    }

    /// Fail a pending request, e.g. after a caller-side timeout
    ///
    /// Returns `false` if the request already completed.
    pub fn fail_request(&mut self, id: &CorrelationId, error: PubSubError) -> bool {
        match self.calls.fail(id, error) {
            Some(intent) => {
                self.forget_failed_subscribe(&intent);
                true
            }
            None => false,
        }
    }

    /// Drop a pending request without completing it
    pub fn drop_request(&mut self, id: &CorrelationId) -> bool {
        match self.calls.drop_pending(id) {
            Some(call) => {
                self.forget_failed_subscribe(call.intent());
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn set_mode(&mut self, mode: DispatchMode) {
        self.mode = mode;
        self.phase.set(self.mode.phase());
    }

    fn take_mode(&mut self) -> DispatchMode {
        let mode = std::mem::replace(&mut self.mode, DispatchMode::Disconnected);
        self.phase.set(ConnectionPhase::Disconnected);
        mode
    }

    fn check_request(&self, operation: &str, channel: Option<&str>) -> Result<()> {
        if !matches!(self.mode, DispatchMode::Connected) {
            return Err(PubSubError::CallerMisuse(format!(
                "{} called while {}",
                operation,
                self.phase()
            )));
        }
        if channel.is_some_and(str::is_empty) {
            return Err(PubSubError::CallerMisuse(format!(
                "{} requires a channel name",
                operation
            )));
        }
        Ok(())
    }

    fn send_message(&mut self, message: &ClientMessage) -> Result<()> {
        let frame = self.codec.serialize(message)?;
        self.transport.send(frame)?;
        self.metrics.increment_sent();
        Ok(())
    }

    fn send_request(
        &mut self,
        message: ClientMessage,
        intent: Intent,
        completion: Completion,
    ) -> Option<CorrelationId> {
        let id = message.correlation_id.clone();
        debug!("Sending {:?} as {}", intent, id);
        self.calls.register(PendingCall::new(id.clone(), intent, completion));

        match self.send_message(&message) {
            Ok(()) => Some(id),
            Err(e) => {
                warn!("Failed to send request {}: {}", id, e);
                self.fail_request(&id, e);
                None
            }
        }
    }

    fn forget_failed_subscribe(&mut self, intent: &Intent) {
        if let Intent::Subscribe { channel } = intent {
            self.subscriptions.remove(channel);
        }
    }

    fn complete_handshake(&mut self, batch: Vec<ServerMessage>) {
        let DispatchMode::Handshaking {
            handshake_id,
            completion,
            ..
        } = self.take_mode()
        else {
            return;
        };

        let mut messages = batch.into_iter();
        let result = match messages.next() {
            None => Err(PubSubError::ProtocolViolation(
                "empty batch while waiting for handshake reply".to_string(),
            )),
            Some(reply)
                if reply.method != Method::ConnectResponse
                    || handshake_id.is_none()
                    || reply.correlation_id != handshake_id =>
            {
                Err(PubSubError::ProtocolViolation(format!(
                    "expected handshake reply {:?}, got {:?} {:?}",
                    handshake_id, reply.method, reply.correlation_id
                )))
            }
            Some(reply) => match &reply.error {
                Some(error) => Err(PubSubError::Server(error.clone())),
                None => Ok(reply),
            },
        };

        for extra in messages {
            debug!("Discarding {:?} that arrived with the handshake reply", extra.method);
        }

        match result {
            Ok(reply) => {
                self.set_mode(DispatchMode::Connected);
                info!("Connected as '{}'", self.credentials.user);
                completion(Ok(reply));
            }
            Err(e) => {
                warn!("Handshake failed: {}", e);
                completion(Err(e));
                self.teardown("handshake failed");
            }
        }
    }

    fn fail_handshake(&mut self, error: PubSubError) {
        if let DispatchMode::Handshaking { completion, .. } = self.take_mode() {
            warn!("Handshake failed: {}", error);
            completion(Err(error));
            self.teardown("handshake failed");
        }
    }

    fn apply_outcome(&mut self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Resolved(_) | DispatchOutcome::Routed { .. } => {}
            DispatchOutcome::ForcedRefresh => {
                info!("Server requested a credentials refresh");
                self.delegate.on_forced_refresh();
            }
            DispatchOutcome::ServerDisconnect(info) => {
                info!("Server disconnected us: {}", info.reason);
                self.take_mode();
                self.delegate.on_disconnect(&info);
                self.teardown("server disconnect");
            }
            DispatchOutcome::Violation(error) => self.report_violation(error),
        }
    }

    fn report_violation(&mut self, error: PubSubError) {
        warn!("{}", error);
        self.metrics.increment_violations();
        self.delegate.on_error(&error);
    }

    fn fail_connection(&mut self, error: PubSubError, info: DisconnectInfo, report_error: bool) {
        match self.take_mode() {
            DispatchMode::Disconnected => {
                debug!("Ignoring transport failure while disconnected: {}", error);
                return;
            }
            DispatchMode::Handshaking { completion, .. } => {
                warn!("Connection failed during handshake: {}", error);
                completion(Err(error));
            }
            DispatchMode::Connected => {
                warn!("Connection lost: {}", error);
                if report_error {
                    self.delegate.on_error(&error);
                }
                self.delegate.on_disconnect(&info);
            }
        }
        self.teardown(&info.reason);
    }

    /// Release everything tied to the connection; the mode is already Disconnected
    fn teardown(&mut self, reason: &str) {
        self.transport.close();
        self.transport_events = None;

        let closed = PubSubError::ConnectionClosed(reason.to_string());
        let failed = self.calls.fail_all(&closed);
        let cleared = self.subscriptions.clear();

        if !failed.is_empty() || cleared > 0 {
            info!(
                "Connection torn down ({}): failed {} pending calls, cleared {} subscriptions",
                reason,
                failed.len(),
                cleared
            );
        }
    }
}

impl std::fmt::Debug for ConnectionStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionStateMachine")
            .field("mode", &self.mode)
            .field("pending_calls", &self.calls.len())
            .field("subscriptions", &self.subscriptions)
            .finish_non_exhaustive()
    }
}
