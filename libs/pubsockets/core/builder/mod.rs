pub mod states;

use crate::core::client::PubSubClient;
use crate::core::config::ClientConfig;
use crate::core::machine::ConnectionStateMachine;
use crate::core::message::Credentials;
use crate::core::websocket::WebSocketTransport;
use crate::traits::*;
use states::*;
use std::sync::Arc;
use std::time::Duration;

/// Type-state builder for PubSubClient
///
/// This builder uses Rust's type system to enforce that required
/// fields (URL and credentials) are set before the client can be built.
///
/// Everything else has a default: the WebSocket transport for the URL,
/// the JSON codec, sequential correlation ids, and a no-op delegate.
pub struct PubSubClientBuilder<U, C>
where
    U: UrlState,
    C: CredentialsState,
{
    _state: TypeState<U, C>,
    url: Option<String>,
    credentials: Option<Credentials>,
    transport: Option<Box<dyn Transport>>,
    codec: Option<Box<dyn MessageCodec>>,
    message_builder: Option<Box<dyn MessageBuilder>>,
    delegate: Option<Arc<dyn ConnectionDelegate>>,
    request_timeout: Option<Duration>,
}

impl PubSubClientBuilder<NoUrl, NoCredentials> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            url: None,
            credentials: None,
            transport: None,
            codec: None,
            message_builder: None,
            delegate: None,
            request_timeout: None,
        }
    }
}

impl Default for PubSubClientBuilder<NoUrl, NoCredentials> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U, C> PubSubClientBuilder<U, C>
where
    U: UrlState,
    C: CredentialsState,
{
    fn transition<U2, C2>(self) -> PubSubClientBuilder<U2, C2>
    where
        U2: UrlState,
        C2: CredentialsState,
    {
        PubSubClientBuilder {
            _state: TypeState::new(),
            url: self.url,
            credentials: self.credentials,
            transport: self.transport,
            codec: self.codec,
            message_builder: self.message_builder,
            delegate: self.delegate,
            request_timeout: self.request_timeout,
        }
    }

    /// Use a custom transport instead of the WebSocket default
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    pub fn codec(mut self, codec: impl MessageCodec + 'static) -> Self {
        self.codec = Some(Box::new(codec));
        self
    }

    pub fn message_builder(mut self, builder: impl MessageBuilder + 'static) -> Self {
        self.message_builder = Some(Box::new(builder));
        self
    }

    /// Set the delegate receiving connection-level notifications
    pub fn delegate(mut self, delegate: Arc<dyn ConnectionDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Fail requests that get no reply within `timeout`
    ///
    /// Only the async client applies this. Without it a request waits
    /// until its reply arrives or the connection goes away.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

// URL setting
impl<C> PubSubClientBuilder<NoUrl, C>
where
    C: CredentialsState,
{
    pub fn url(mut self, url: impl Into<String>) -> PubSubClientBuilder<HasUrl, C> {
        self.url = Some(url.into());
        self.transition()
    }
}

// Credentials setting
impl<U> PubSubClientBuilder<U, NoCredentials>
where
    U: UrlState,
{
    pub fn credentials(mut self, credentials: Credentials) -> PubSubClientBuilder<U, HasCredentials> {
        self.credentials = Some(credentials);
        self.transition()
    }
}

// Build methods - only available when all required fields are set
impl PubSubClientBuilder<HasUrl, HasCredentials> {
    /// Assemble the configuration without starting anything
    pub fn build_config(self) -> Result<ClientConfig> {
        let url = self
            .url
            .ok_or_else(|| PubSubError::Configuration("URL must be set".into()))?;
        let credentials = self
            .credentials
            .ok_or_else(|| PubSubError::Configuration("credentials must be set".into()))?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Box::new(WebSocketTransport::new(url.clone())?),
        };

        Ok(ClientConfig {
            url,
            credentials,
            transport,
            codec: self.codec.unwrap_or_else(|| Box::new(JsonCodec::new())),
            message_builder: self
                .message_builder
                .unwrap_or_else(|| Box::new(SequentialMessageBuilder::new())),
            delegate: self.delegate.unwrap_or_else(|| Arc::new(NoOpDelegate)),
            request_timeout: self.request_timeout,
        })
    }

    /// Build a bare state machine to drive by hand
    pub fn build_state_machine(self) -> Result<ConnectionStateMachine> {
        Ok(ConnectionStateMachine::new(self.build_config()?))
    }

    /// Build the client and spawn its connection task
    ///
    /// The client starts disconnected; call [`PubSubClient::connect`].
    pub async fn build(self) -> Result<PubSubClient> {
        PubSubClient::new(self.build_config()?)
    }
}
