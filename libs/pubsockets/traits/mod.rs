//! # PubSockets Traits
//!
//! The collaborator seams of the pub/sub protocol engine:
//!
//! - **Transport**: Duplex frame stream emitting lifecycle events
//! - **MessageCodec**: Frame ⇄ structured message conversion
//! - **MessageBuilder**: Outbound request construction and id assignment
//! - **ChannelObserver**: Per-channel event sink
//! - **ConnectionDelegate**: Connection-level notifications
//!
//! ## Example
//!
//! ```rust,ignore
//! use pubsockets::*;
//!
//! struct Printer;
//!
//! impl ChannelObserver for Printer {
//!     fn on_message(&self, channel: &str, message: &ServerMessage) {
//!         println!("[{}] {:?}", channel, message.data());
//!     }
//! }
//! ```

pub mod codec;
pub mod error;
pub mod message_builder;
pub mod observer;
pub mod transport;

// Re-export commonly used types
pub use codec::{JsonCodec, MessageCodec};
pub use error::{PubSubError, Result};
pub use message_builder::{MessageBuilder, SequentialMessageBuilder};
pub use observer::{ChannelObserver, ConnectionDelegate, NoOpDelegate, NoOpObserver};
pub use transport::{Transport, TransportEvent, TransportEventSender};
