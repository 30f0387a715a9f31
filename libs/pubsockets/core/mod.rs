//! # PubSockets core
//!
//! The protocol engine and its async front end.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pubsockets::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = pubsockets::builder()
//!         .url("ws://localhost:8000/connection/websocket")
//!         .credentials(Credentials::new("42", "1700000000", "token"))
//!         .request_timeout(Duration::from_secs(10))
//!         .build()
//!         .await?;
//!
//!     client.connect().await?;
//!     client.subscribe("news", Arc::new(MyObserver)).await?;
//!     client.publish("news", serde_json::json!({"text": "hello"})).await?;
//!
//!     // Receive connection events
//!     while let Ok(event) = client.recv_event() {
//!         println!("Event: {:?}", event);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod connection_state;
pub mod correlation;
pub mod dispatcher;
pub mod machine;
pub mod message;
pub mod settings;
pub mod subscriptions;
pub mod websocket;

// Re-export main types
pub use builder::{states, PubSubClientBuilder};
pub use client::{ClientEvent, Metrics, PubSubClient};
pub use config::ClientConfig;
pub use connection_state::{AtomicConnectionPhase, AtomicMetrics, ConnectionPhase};
pub use correlation::{Completion, CorrelationTable, PendingCall};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use machine::{ConnectionStateMachine, DispatchMode};
pub use message::{
    ClientMessage, ClientMethod, CorrelationId, Credentials, DisconnectInfo, Intent, Method,
    ServerError, ServerMessage,
};
pub use settings::{ClientSettings, ConfigError};
pub use subscriptions::SubscriptionRegistry;
pub use websocket::WebSocketTransport;

// Re-export traits for convenience
pub use crate::traits::*;

/// Create a new pub/sub client builder
///
/// # Example
/// ```ignore
/// let machine = pubsockets::builder()
///     .url("ws://localhost:8000/connection/websocket")
///     .credentials(Credentials::new("42", "1700000000", "token"))
///     .transport(MyTransport::new())
///     .build_state_machine()?;
/// ```
pub fn builder() -> PubSubClientBuilder<states::NoUrl, states::NoCredentials> {
    PubSubClientBuilder::new()
}
