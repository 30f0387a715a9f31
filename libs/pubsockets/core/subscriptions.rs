//! Subscription registry
//!
//! A channel is present while the client believes it is subscribed or has
//! a subscribe request outstanding for it.

use crate::traits::ChannelObserver;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Observers keyed by channel name
#[derive(Default)]
pub struct SubscriptionRegistry {
    observers: HashMap<String, Arc<dyn ChannelObserver>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer` for `channel`
    ///
    /// Last write wins: a second subscribe for the same channel replaces
    /// the first observer.
    pub fn insert(&mut self, channel: impl Into<String>, observer: Arc<dyn ChannelObserver>) {
        let channel = channel.into();
        if self.observers.insert(channel.clone(), observer).is_some() {
            warn!("Channel '{}' subscribed twice, replacing its observer", channel);
        }
    }

    pub fn get(&self, channel: &str) -> Option<Arc<dyn ChannelObserver>> {
        self.observers.get(channel).cloned()
    }

    pub fn remove(&mut self, channel: &str) -> Option<Arc<dyn ChannelObserver>> {
        self.observers.remove(channel)
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.observers.contains_key(channel)
    }

    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.observers.keys().cloned().collect();
        channels.sort();
        channels
    }

    pub fn clear(&mut self) -> usize {
        let count = self.observers.len();
        self.observers.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("channels", &self.channels())
            .finish()
    }
}
