use crate::core::message::ServerError;
use thiserror::Error;

/// Main error type for pubsockets
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PubSubError {
    /// Underlying stream closed with a close code
    #[error("Transport closed ({code}): {reason}")]
    Transport { code: u16, reason: String },

    /// Underlying stream errored without a close handshake
    #[error("Transport error: {0}")]
    TransportFailure(String),

    /// A received message cannot be interpreted in the current state
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// The remote service attached an error to its reply
    #[error("Server error: {0}")]
    Server(ServerError),

    /// The public API was used in a way the current state does not allow
    #[error("Invalid call: {0}")]
    CallerMisuse(String),

    /// The connection went away while a request was outstanding
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Frame could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(String),

    /// Internal channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type for pubsockets operations
pub type Result<T> = std::result::Result<T, PubSubError>;
