//! Correlation table for in-flight requests
//!
//! Maps a correlation id to the one-shot completion of the request that
//! carried it. An entry lives from send time until exactly one reply with
//! the same id arrives, or until the connection sweeps it on disconnect.
//! There are no implicit timeouts; callers that need them drop or fail
//! the entry themselves.

use crate::core::message::{CorrelationId, Intent, ServerMessage};
use crate::traits::{PubSubError, Result};
use std::collections::HashMap;
use tracing::{debug, warn};

/// One-shot completion handler for a request
pub type Completion = Box<dyn FnOnce(Result<ServerMessage>) + Send + 'static>;

/// A request waiting for its reply
pub struct PendingCall {
    id: CorrelationId,
    intent: Intent,
    completion: Completion,
}

impl PendingCall {
    pub fn new(id: CorrelationId, intent: Intent, completion: Completion) -> Self {
        Self {
            id,
            intent,
            completion,
        }
    }

    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    pub fn intent(&self) -> &Intent {
        &self.intent
    }

    /// Complete with the reply, turning an attached server error into `Err`
    fn complete(self, message: ServerMessage) -> Intent {
        let result = match &message.error {
            Some(error) => Err(PubSubError::Server(error.clone())),
            None => Ok(message),
        };
        (self.completion)(result);
        self.intent
    }

    /// Complete with a failure
    pub fn fail(self, error: PubSubError) -> Intent {
        (self.completion)(Err(error));
        self.intent
    }
}

impl std::fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCall")
            .field("id", &self.id)
            .field("intent", &self.intent)
            .finish_non_exhaustive()
    }
}

/// Pending completions keyed by correlation id
#[derive(Debug, Default)]
pub struct CorrelationTable {
    pending: HashMap<CorrelationId, PendingCall>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a pending call
    ///
    /// Uniqueness of ids is the message builder's job. A duplicate id
    /// replaces the earlier entry, whose completion is then never invoked.
    pub fn register(&mut self, call: PendingCall) {
        if let Some(previous) = self.pending.insert(call.id.clone(), call) {
            warn!(
                "Correlation id {} registered twice, dropping earlier {:?} call",
                previous.id, previous.intent
            );
        }
    }

    /// Resolve the call registered under `id` with `message`
    ///
    /// Returns the intent of the resolved call, or `None` if nothing was
    /// waiting for this id (the message may then be an unsolicited event).
    pub fn resolve(&mut self, id: &CorrelationId, message: &ServerMessage) -> Option<Intent> {
        let call = self.pending.remove(id)?;
        debug!("Resolving {:?} call {}", call.intent, id);
        Some(call.complete(message.clone()))
    }

    /// Remove a pending call without invoking its completion
    pub fn drop_pending(&mut self, id: &CorrelationId) -> Option<PendingCall> {
        self.pending.remove(id)
    }

    /// Fail the call registered under `id`, if any
    pub fn fail(&mut self, id: &CorrelationId, error: PubSubError) -> Option<Intent> {
        self.pending.remove(id).map(|call| call.fail(error))
    }

    /// Fail every pending call with a clone of `error`
    ///
    /// Returns the intents of the failed calls.
    pub fn fail_all(&mut self, error: &PubSubError) -> Vec<Intent> {
        self.pending
            .drain()
            .map(|(_, call)| call.fail(error.clone()))
            .collect()
    }

    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
