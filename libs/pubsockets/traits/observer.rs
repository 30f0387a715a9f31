//! Per-channel observers and the connection-level delegate
//!
//! Both are invoked from the connection's actor task, one call at a time,
//! in the order the triggering frames arrived. Implementations should not
//! block; hand heavy work off to another thread or channel.

use crate::core::message::{DisconnectInfo, ServerMessage};
use crate::traits::error::PubSubError;

/// Receives the events of one subscribed channel
///
/// All methods default to doing nothing, so observers only implement the
/// events they care about.
///
/// # Example
///
/// ```ignore
/// struct NewsObserver;
///
/// impl ChannelObserver for NewsObserver {
///     fn on_message(&self, channel: &str, message: &ServerMessage) {
///         println!("{}: {:?}", channel, message.data());
///     }
/// }
/// ```
pub trait ChannelObserver: Send + Sync + 'static {
    /// A publication arrived on the channel
    fn on_message(&self, _channel: &str, _message: &ServerMessage) {}

    /// Another client joined the channel
    fn on_join(&self, _channel: &str, _message: &ServerMessage) {}

    /// Another client left the channel
    fn on_leave(&self, _channel: &str, _message: &ServerMessage) {}

    /// The server ended our subscription
    ///
    /// Called once, right before the subscription is dropped.
    fn on_unsubscribe(&self, _channel: &str, _message: &ServerMessage) {}
}

/// Receives connection-scoped notifications
pub trait ConnectionDelegate: Send + Sync + 'static {
    /// A connection-level or unroutable error occurred
    fn on_error(&self, _error: &PubSubError) {}

    /// The server asked the client to refresh its credentials
    fn on_forced_refresh(&self) {}

    /// The connection is gone
    fn on_disconnect(&self, _info: &DisconnectInfo) {}
}

/// A delegate that ignores every notification
pub struct NoOpDelegate;

impl ConnectionDelegate for NoOpDelegate {}

/// An observer that ignores every event
pub struct NoOpObserver;

impl ChannelObserver for NoOpObserver {}
