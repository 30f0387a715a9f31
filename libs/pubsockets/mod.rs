//! # PubSockets
//!
//! A client-side engine for a stateful pub/sub protocol over a persistent
//! duplex connection.
//!
//! ## Features
//!
//! - **Single-writer state machine**: One task owns all protocol state
//! - **Request/response correlation**: Every request resolves exactly once
//! - **Per-channel observers**: Server pushes routed by channel name
//! - **Type-state builder**: Compile-time guarantees for required configuration
//! - **Pluggable collaborators**: Transport, codec and message builder are traits

pub mod traits;
pub mod core;

// Re-export all traits
pub use traits::*;

// Re-export core client functionality
pub use crate::core::{
    builder, client, config, connection_state, correlation, dispatcher, machine, message,
    settings, subscriptions, websocket,
    builder::{states, PubSubClientBuilder},
    client::{ClientEvent, Metrics, PubSubClient},
    config::ClientConfig,
    connection_state::{AtomicConnectionPhase, AtomicMetrics, ConnectionPhase},
    correlation::{Completion, CorrelationTable, PendingCall},
    dispatcher::{DispatchOutcome, Dispatcher},
    machine::{ConnectionStateMachine, DispatchMode},
    message::{
        ClientMessage, ClientMethod, CorrelationId, Credentials, DisconnectInfo, Intent, Method,
        ServerError, ServerMessage,
    },
    settings::{ClientSettings, ConfigError},
    subscriptions::SubscriptionRegistry,
    websocket::WebSocketTransport,
};
