//! Topic index: topic name to subscribed connection ids.

use std::collections::{HashMap, HashSet};

use crate::connection::ConnectionId;

/// Mapping from topic name to the connections subscribed to it.
///
/// Topics with no subscribers are removed so the index only grows with live
/// interest.
#[derive(Debug, Default)]
pub(crate) struct TopicIndex {
    topics: HashMap<String, HashSet<ConnectionId>>,
}

impl TopicIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. Returns `false` if it was already present.
    pub fn insert(&mut self, topic: &str, id: ConnectionId) -> bool {
        match self.topics.get_mut(topic) {
            Some(subscribers) => subscribers.insert(id),
            None => {
                self.topics.insert(topic.to_string(), HashSet::from([id]));
                true
            }
        }
    }

    /// Remove a subscriber. Returns `false` if it was not present.
    pub fn remove(&mut self, topic: &str, id: ConnectionId) -> bool {
        let Some(subscribers) = self.topics.get_mut(topic) else {
            return false;
        };

        let removed = subscribers.remove(&id);
        if subscribers.is_empty() {
            self.topics.remove(topic);
        }
        removed
    }

    pub fn subscribers(&self, topic: &str) -> Option<&HashSet<ConnectionId>> {
        self.topics.get(topic)
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, HashSet::len)
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Total number of (topic, connection) pairs.
    pub fn subscription_count(&self) -> usize {
        self.topics.values().map(HashSet::len).sum()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = (&String, &HashSet<ConnectionId>)> {
        self.topics.iter()
    }

    pub fn clear(&mut self) {
        self.topics.clear();
    }
}
