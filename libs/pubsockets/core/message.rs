//! Protocol data model
//!
//! `ServerMessage` values are only ever produced by a [`MessageCodec`]
//! and never mutated afterwards. `ClientMessage` values are produced by a
//! [`MessageBuilder`], which is also responsible for handing out unique
//! correlation ids.
//!
//! [`MessageCodec`]: crate::traits::MessageCodec
//! [`MessageBuilder`]: crate::traits::MessageBuilder

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Client-generated identifier echoed back by the server in a reply
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for CorrelationId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Method carried by a message coming from the server
///
/// Replies to our own requests use the `*Response` variants; unsolicited
/// pushes use the remaining ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    ConnectResponse,
    SubscribeResponse,
    UnsubscribeResponse,
    PublishResponse,
    PresenceResponse,
    HistoryResponse,
    PingResponse,
    Message,
    Join,
    Leave,
    Unsubscribe,
    Refresh,
    Disconnect,
    Unknown(String),
}

impl Method {
    /// Events scoped to a single channel and routed to its observer
    pub fn is_channel_event(&self) -> bool {
        matches!(
            self,
            Method::Message | Method::Join | Method::Leave | Method::Unsubscribe
        )
    }

    /// Map a wire method name to its reply or push variant
    pub fn from_wire(name: &str, correlated: bool) -> Self {
        match (name, correlated) {
            ("connect", true) => Method::ConnectResponse,
            ("subscribe", true) => Method::SubscribeResponse,
            ("unsubscribe", true) => Method::UnsubscribeResponse,
            ("publish", true) => Method::PublishResponse,
            ("presence", true) => Method::PresenceResponse,
            ("history", true) => Method::HistoryResponse,
            ("ping", true) => Method::PingResponse,
            ("message", _) => Method::Message,
            ("join", _) => Method::Join,
            ("leave", _) => Method::Leave,
            ("unsubscribe", false) => Method::Unsubscribe,
            ("refresh", _) => Method::Refresh,
            ("disconnect", _) => Method::Disconnect,
            (other, _) => Method::Unknown(other.to_string()),
        }
    }
}

/// Error payload attached to a server reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub code: Option<i64>,
    pub message: String,
}

impl ServerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

/// A structured message decoded from one server frame
#[derive(Debug, Clone, PartialEq)]
pub struct ServerMessage {
    pub correlation_id: Option<CorrelationId>,
    pub method: Method,
    pub body: Option<Map<String, Value>>,
    pub error: Option<ServerError>,
}

impl ServerMessage {
    /// An unsolicited push with no correlation id
    pub fn push(method: Method, body: Map<String, Value>) -> Self {
        Self {
            correlation_id: None,
            method,
            body: Some(body),
            error: None,
        }
    }

    /// A reply to request `id`
    pub fn reply(id: impl Into<CorrelationId>, method: Method) -> Self {
        Self {
            correlation_id: Some(id.into()),
            method,
            body: None,
            error: None,
        }
    }

    pub fn with_body(mut self, body: Map<String, Value>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_error(mut self, error: ServerError) -> Self {
        self.error = Some(error);
        self
    }

    /// The `channel` field of the body, if present and a non-empty string
    pub fn channel(&self) -> Option<&str> {
        self.body
            .as_ref()
            .and_then(|body| body.get("channel"))
            .and_then(Value::as_str)
            .filter(|channel| !channel.is_empty())
    }

    /// A string field from the body
    pub fn body_str(&self, key: &str) -> Option<&str> {
        self.body
            .as_ref()
            .and_then(|body| body.get(key))
            .and_then(Value::as_str)
    }

    /// The `data` field of the body (publication payload)
    pub fn data(&self) -> Option<&Value> {
        self.body.as_ref().and_then(|body| body.get("data"))
    }
}

/// Outbound method sent by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientMethod {
    Connect,
    Subscribe,
    Unsubscribe,
    Publish,
    Presence,
    History,
    Ping,
}

impl ClientMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientMethod::Connect => "connect",
            ClientMethod::Subscribe => "subscribe",
            ClientMethod::Unsubscribe => "unsubscribe",
            ClientMethod::Publish => "publish",
            ClientMethod::Presence => "presence",
            ClientMethod::History => "history",
            ClientMethod::Ping => "ping",
        }
    }
}

/// A request ready to be serialized and handed to the transport
#[derive(Debug, Clone, PartialEq)]
pub struct ClientMessage {
    pub correlation_id: CorrelationId,
    pub method: ClientMethod,
    pub payload: Map<String, Value>,
}

/// Credentials presented during the handshake
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub user: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub info: String,
    #[serde(default)]
    pub token: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, timestamp: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            timestamp: timestamp.into(),
            info: String::new(),
            token: token.into(),
        }
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = info.into();
        self
    }
}

/// What an outstanding request was for
///
/// Kept alongside each pending completion so the dispatcher can apply
/// the request's side effects when its reply arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Connect,
    Subscribe { channel: String },
    Unsubscribe { channel: String },
    Publish { channel: String },
    Presence { channel: String },
    History { channel: String },
    Ping,
}

impl Intent {
    pub fn channel(&self) -> Option<&str> {
        match self {
            Intent::Subscribe { channel }
            | Intent::Unsubscribe { channel }
            | Intent::Publish { channel }
            | Intent::Presence { channel }
            | Intent::History { channel } => Some(channel),
            Intent::Connect | Intent::Ping => None,
        }
    }
}

/// Close details reported to the connection delegate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectInfo {
    pub code: u16,
    pub reason: String,
    pub clean: bool,
}

impl DisconnectInfo {
    pub fn new(code: u16, reason: impl Into<String>, clean: bool) -> Self {
        Self {
            code,
            reason: reason.into(),
            clean,
        }
    }
}
