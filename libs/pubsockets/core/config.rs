use crate::core::message::Credentials;
use crate::traits::*;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for one pub/sub connection
///
/// This struct holds every collaborator the connection state machine
/// needs. It is built using the type-state builder pattern.
pub struct ClientConfig {
    /// Server URL (wss:// or ws://), used by the default transport
    pub(crate) url: String,

    /// Credentials presented in the handshake
    pub(crate) credentials: Credentials,

    /// Frame transport
    pub(crate) transport: Box<dyn Transport>,

    /// Frame ⇄ message conversion
    pub(crate) codec: Box<dyn MessageCodec>,

    /// Outbound request construction
    pub(crate) message_builder: Box<dyn MessageBuilder>,

    /// Connection-level notifications
    pub(crate) delegate: Arc<dyn ConnectionDelegate>,

    /// Optional per-request timeout applied by the async client
    pub(crate) request_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("user", &self.credentials.user)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}
