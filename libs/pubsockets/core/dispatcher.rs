//! Steady-state message dispatch
//!
//! # Routing
//!
//! ```text
//! ServerMessage ─┬─ correlation id matches a pending call? ── complete it ─┐
//!                │                                                          │
//!                │        (unsubscribe reply that is itself an event) ◄─────┤
//!                ▼                                                          ▼
//!          channel event? ── observer(channel) ── on_message / on_join      done
//!                │                                on_leave / on_unsubscribe
//!                ├─ refresh ──────► ForcedRefresh
//!                ├─ disconnect ───► ServerDisconnect
//!                └─ anything else ► ProtocolViolation
//! ```
//!
//! A correlated reply is terminal unless the resolved request was an
//! unsubscribe and the reply is itself an `Unsubscribe` event; that event
//! then also retires the subscription. A plain `UnsubscribeResponse` never
//! removes the subscription; only the server's `Unsubscribe` event does.

use crate::core::correlation::CorrelationTable;
use crate::core::message::{DisconnectInfo, Intent, Method, ServerMessage};
use crate::core::subscriptions::SubscriptionRegistry;
use crate::traits::PubSubError;
use serde_json::Value;
use tracing::debug;

/// Close code reported when the server pushes a disconnect
pub const SERVER_DISCONNECT_CODE: u16 = 1000;

/// What the dispatcher did with a message
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// A pending call was completed
    Resolved(Intent),
    /// A channel event reached its observer
    Routed { channel: String, method: Method },
    /// The server asked for fresh credentials
    ForcedRefresh,
    /// The server is closing the connection
    ServerDisconnect(DisconnectInfo),
    /// The message could not be interpreted
    Violation(PubSubError),
}

/// Routes messages against the pending calls and subscriptions
pub struct Dispatcher<'a> {
    calls: &'a mut CorrelationTable,
    subscriptions: &'a mut SubscriptionRegistry,
}

impl<'a> Dispatcher<'a> {
    pub fn new(calls: &'a mut CorrelationTable, subscriptions: &'a mut SubscriptionRegistry) -> Self {
        Self {
            calls,
            subscriptions,
        }
    }

    /// Handle one message received while connected
    pub fn handle(&mut self, message: &ServerMessage) -> DispatchOutcome {
        if let Some(id) = &message.correlation_id {
            if let Some(intent) = self.calls.resolve(id, message) {
                return self.after_resolve(intent, message);
            }
            debug!("No pending call for {}, treating {:?} as unsolicited", id, message.method);
        }

        match &message.method {
            method if method.is_channel_event() => self.route(message),
            Method::Refresh => DispatchOutcome::ForcedRefresh,
            Method::Disconnect => DispatchOutcome::ServerDisconnect(disconnect_info(message)),
            other => {
                let detail = match &message.correlation_id {
                    Some(id) => format!("unexpected {:?} with unknown correlation id {}", other, id),
                    None => format!("unexpected {:?} message", other),
                };
                DispatchOutcome::Violation(PubSubError::ProtocolViolation(detail))
            }
        }
    }

    fn after_resolve(&mut self, intent: Intent, message: &ServerMessage) -> DispatchOutcome {
        match &intent {
            Intent::Subscribe { channel } if message.error.is_some() => {
                // The server refused, so nothing is outstanding for this channel anymore
                debug!("Subscribe to '{}' rejected, dropping its observer", channel);
                self.subscriptions.remove(channel);
            }
            Intent::Unsubscribe { .. } if message.method == Method::Unsubscribe => {
                return self.route(message);
            }
            _ => {}
        }
        DispatchOutcome::Resolved(intent)
    }

    fn route(&mut self, message: &ServerMessage) -> DispatchOutcome {
        let Some(channel) = message.channel() else {
            return DispatchOutcome::Violation(PubSubError::ProtocolViolation(format!(
                "{:?} event without a channel",
                message.method
            )));
        };

        let Some(observer) = self.subscriptions.get(channel) else {
            return DispatchOutcome::Violation(PubSubError::ProtocolViolation(format!(
                "{:?} event for unsubscribed channel '{}'",
                message.method, channel
            )));
        };

        match message.method {
            Method::Message => observer.on_message(channel, message),
            Method::Join => observer.on_join(channel, message),
            Method::Leave => observer.on_leave(channel, message),
            Method::Unsubscribe => {
                observer.on_unsubscribe(channel, message);
                self.subscriptions.remove(channel);
                debug!("Subscription to '{}' retired", channel);
            }
            ref other => {
                return DispatchOutcome::Violation(PubSubError::ProtocolViolation(format!(
                    "{:?} is not a channel event",
                    other
                )));
            }
        }

        DispatchOutcome::Routed {
            channel: channel.to_string(),
            method: message.method.clone(),
        }
    }
}

fn disconnect_info(message: &ServerMessage) -> DisconnectInfo {
    let reason = message.body_str("reason").unwrap_or("server disconnect");
    let code = message
        .body
        .as_ref()
        .and_then(|body| body.get("code"))
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
        .unwrap_or(SERVER_DISCONNECT_CODE);
    DisconnectInfo::new(code, reason, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::correlation::PendingCall;
    use crate::core::message::{CorrelationId, ServerError};
    use crate::traits::{ChannelObserver, Result};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(String, String)>>,
    }

    impl ChannelObserver for Recorder {
        fn on_message(&self, channel: &str, _message: &ServerMessage) {
            self.events.lock().push(("message".into(), channel.into()));
        }
        fn on_join(&self, channel: &str, _message: &ServerMessage) {
            self.events.lock().push(("join".into(), channel.into()));
        }
        fn on_leave(&self, channel: &str, _message: &ServerMessage) {
            self.events.lock().push(("leave".into(), channel.into()));
        }
        fn on_unsubscribe(&self, channel: &str, _message: &ServerMessage) {
            self.events.lock().push(("unsubscribe".into(), channel.into()));
        }
    }

    fn push(method: Method, body: Value) -> ServerMessage {
        ServerMessage::push(method, body.as_object().cloned().unwrap())
    }

    fn register(table: &mut CorrelationTable, id: u64, intent: Intent) -> Arc<Mutex<Vec<Result<ServerMessage>>>> {
        let outcomes: Arc<Mutex<Vec<Result<ServerMessage>>>> = Arc::default();
        let sink = Arc::clone(&outcomes);
        table.register(PendingCall::new(
            CorrelationId::from(id),
            intent,
            Box::new(move |r| sink.lock().push(r)),
        ));
        outcomes
    }

    #[test]
    fn test_channel_events_reach_observer() {
        let mut calls = CorrelationTable::new();
        let mut subs = SubscriptionRegistry::new();
        let recorder = Arc::new(Recorder::default());
        subs.insert("news", recorder.clone());

        let mut dispatcher = Dispatcher::new(&mut calls, &mut subs);
        for method in [Method::Message, Method::Join, Method::Leave] {
            let outcome = dispatcher.handle(&push(method.clone(), json!({"channel": "news"})));
            assert_eq!(
                outcome,
                DispatchOutcome::Routed { channel: "news".into(), method }
            );
        }

        let names: Vec<String> = recorder.events.lock().iter().map(|(m, _)| m.clone()).collect();
        assert_eq!(names, vec!["message", "join", "leave"]);
        assert!(subs.contains("news"));
    }

    #[test]
    fn test_unsubscribe_event_retires_subscription() {
        let mut calls = CorrelationTable::new();
        let mut subs = SubscriptionRegistry::new();
        let recorder = Arc::new(Recorder::default());
        subs.insert("news", recorder.clone());

        let outcome = Dispatcher::new(&mut calls, &mut subs)
            .handle(&push(Method::Unsubscribe, json!({"channel": "news"})));

        assert!(matches!(outcome, DispatchOutcome::Routed { .. }));
        assert!(!subs.contains("news"));
        assert_eq!(recorder.events.lock().len(), 1);
    }

    #[test]
    fn test_missing_or_unknown_channel_is_violation() {
        let mut calls = CorrelationTable::new();
        let mut subs = SubscriptionRegistry::new();
        let mut dispatcher = Dispatcher::new(&mut calls, &mut subs);

        let outcome = dispatcher.handle(&push(Method::Message, json!({"data": 1})));
        assert!(matches!(outcome, DispatchOutcome::Violation(PubSubError::ProtocolViolation(_))));

        let outcome = dispatcher.handle(&push(Method::Join, json!({"channel": "ghost"})));
        assert!(matches!(outcome, DispatchOutcome::Violation(PubSubError::ProtocolViolation(_))));
    }

    #[test]
    fn test_correlated_reply_is_terminal() {
        let mut calls = CorrelationTable::new();
        let mut subs = SubscriptionRegistry::new();
        let outcomes = register(&mut calls, 4, Intent::Publish { channel: "news".into() });

        let reply = ServerMessage::reply(4, Method::PublishResponse);
        let outcome = Dispatcher::new(&mut calls, &mut subs).handle(&reply);

        assert_eq!(outcome, DispatchOutcome::Resolved(Intent::Publish { channel: "news".into() }));
        assert_eq!(outcomes.lock().len(), 1);
    }

    #[test]
    fn test_duplicate_reply_becomes_violation() {
        let mut calls = CorrelationTable::new();
        let mut subs = SubscriptionRegistry::new();
        let outcomes = register(&mut calls, 4, Intent::Ping);

        let reply = ServerMessage::reply(4, Method::PingResponse);
        let mut dispatcher = Dispatcher::new(&mut calls, &mut subs);
        dispatcher.handle(&reply);
        let second = dispatcher.handle(&reply);

        assert!(matches!(second, DispatchOutcome::Violation(_)));
        assert_eq!(outcomes.lock().len(), 1);
    }

    #[test]
    fn test_unsubscribe_response_keeps_subscription() {
        let mut calls = CorrelationTable::new();
        let mut subs = SubscriptionRegistry::new();
        subs.insert("news", Arc::new(Recorder::default()));
        register(&mut calls, 3, Intent::Unsubscribe { channel: "news".into() });

        let reply = ServerMessage::reply(3, Method::UnsubscribeResponse);
        Dispatcher::new(&mut calls, &mut subs).handle(&reply);

        assert!(subs.contains("news"));
    }

    #[test]
    fn test_correlated_unsubscribe_event_passes_through() {
        let mut calls = CorrelationTable::new();
        let mut subs = SubscriptionRegistry::new();
        let recorder = Arc::new(Recorder::default());
        subs.insert("news", recorder.clone());
        let outcomes = register(&mut calls, 3, Intent::Unsubscribe { channel: "news".into() });

        let mut reply = push(Method::Unsubscribe, json!({"channel": "news"}));
        reply.correlation_id = Some(CorrelationId::from(3));
        Dispatcher::new(&mut calls, &mut subs).handle(&reply);

        assert_eq!(outcomes.lock().len(), 1);
        assert!(!subs.contains("news"));
        assert_eq!(recorder.events.lock()[0].0, "unsubscribe");
    }

    #[test]
    fn test_correlated_message_to_unsubscribe_stays_terminal() {
        let mut calls = CorrelationTable::new();
        let mut subs = SubscriptionRegistry::new();
        let recorder = Arc::new(Recorder::default());
        subs.insert("news", recorder.clone());
        let outcomes = register(&mut calls, 4, Intent::Unsubscribe { channel: "news".into() });

        let mut reply = push(Method::Message, json!({"channel": "news", "data": 1}));
        reply.correlation_id = Some(CorrelationId::from(4));
        let outcome = Dispatcher::new(&mut calls, &mut subs).handle(&reply);

        assert!(matches!(outcome, DispatchOutcome::Resolved(Intent::Unsubscribe { .. })));
        assert_eq!(outcomes.lock().len(), 1);
        assert!(recorder.events.lock().is_empty());
        assert!(subs.contains("news"));
    }

    #[test]
    fn test_rejected_subscribe_drops_observer() {
        let mut calls = CorrelationTable::new();
        let mut subs = SubscriptionRegistry::new();
        subs.insert("secret", Arc::new(Recorder::default()));
        let outcomes = register(&mut calls, 2, Intent::Subscribe { channel: "secret".into() });

        let reply = ServerMessage::reply(2, Method::SubscribeResponse)
            .with_error(ServerError::new("permission denied"));
        Dispatcher::new(&mut calls, &mut subs).handle(&reply);

        assert!(!subs.contains("secret"));
        assert!(matches!(outcomes.lock()[0], Err(PubSubError::Server(_))));
    }

    #[test]
    fn test_refresh_and_disconnect_pushes() {
        let mut calls = CorrelationTable::new();
        let mut subs = SubscriptionRegistry::new();
        let mut dispatcher = Dispatcher::new(&mut calls, &mut subs);

        assert_eq!(
            dispatcher.handle(&push(Method::Refresh, json!({}))),
            DispatchOutcome::ForcedRefresh
        );
        assert_eq!(
            dispatcher.handle(&push(Method::Disconnect, json!({"reason": "shutdown"}))),
            DispatchOutcome::ServerDisconnect(DisconnectInfo::new(1000, "shutdown", true))
        );
    }

    #[test]
    fn test_unknown_method_is_violation() {
        let mut calls = CorrelationTable::new();
        let mut subs = SubscriptionRegistry::new();
        let outcome = Dispatcher::new(&mut calls, &mut subs)
            .handle(&push(Method::Unknown("bogus".into()), json!({})));
        assert!(matches!(outcome, DispatchOutcome::Violation(_)));
    }
}
