use crate::core::message::{ClientMessage, ClientMethod, CorrelationId, Credentials};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// Trait for constructing outbound requests
///
/// Every built message must carry a correlation id that is unique among
/// the requests still waiting for a reply.
pub trait MessageBuilder: Send + Sync {
    fn build_handshake(&self, credentials: &Credentials) -> ClientMessage;

    fn build_subscribe(&self, channel: &str) -> ClientMessage;

    fn build_publish(&self, channel: &str, data: Value) -> ClientMessage;

    fn build_unsubscribe(&self, channel: &str) -> ClientMessage;

    fn build_presence(&self, channel: &str) -> ClientMessage;

    fn build_history(&self, channel: &str) -> ClientMessage;

    fn build_ping(&self) -> ClientMessage;
}

/// Builder that numbers requests 1, 2, 3, ...
#[derive(Debug)]
pub struct SequentialMessageBuilder {
    next_id: AtomicU64,
}

impl SequentialMessageBuilder {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first_id: u64) -> Self {
        Self {
            next_id: AtomicU64::new(first_id),
        }
    }

    fn next_id(&self) -> CorrelationId {
        CorrelationId::from(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn message(&self, method: ClientMethod, payload: Map<String, Value>) -> ClientMessage {
        ClientMessage {
            correlation_id: self.next_id(),
            method,
            payload,
        }
    }

    fn channel_message(&self, method: ClientMethod, channel: &str) -> ClientMessage {
        let mut payload = Map::new();
        payload.insert("channel".to_string(), Value::String(channel.to_string()));
        self.message(method, payload)
    }
}

impl Default for SequentialMessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBuilder for SequentialMessageBuilder {
    fn build_handshake(&self, credentials: &Credentials) -> ClientMessage {
        let mut payload = Map::new();
        payload.insert("user".to_string(), Value::String(credentials.user.clone()));
        payload.insert(
            "timestamp".to_string(),
            Value::String(credentials.timestamp.clone()),
        );
        payload.insert("info".to_string(), Value::String(credentials.info.clone()));
        payload.insert("token".to_string(), Value::String(credentials.token.clone()));
        self.message(ClientMethod::Connect, payload)
    }

    fn build_subscribe(&self, channel: &str) -> ClientMessage {
        self.channel_message(ClientMethod::Subscribe, channel)
    }

    fn build_publish(&self, channel: &str, data: Value) -> ClientMessage {
        let mut payload = Map::new();
        payload.insert("channel".to_string(), Value::String(channel.to_string()));
        payload.insert("data".to_string(), data);
        self.message(ClientMethod::Publish, payload)
    }

    fn build_unsubscribe(&self, channel: &str) -> ClientMessage {
        self.channel_message(ClientMethod::Unsubscribe, channel)
    }

    fn build_presence(&self, channel: &str) -> ClientMessage {
        self.channel_message(ClientMethod::Presence, channel)
    }

    fn build_history(&self, channel: &str) -> ClientMessage {
        self.channel_message(ClientMethod::History, channel)
    }

    fn build_ping(&self) -> ClientMessage {
        self.message(ClientMethod::Ping, Map::new())
    }
}
