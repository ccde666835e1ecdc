//! Topic store: retained value history per topic.

use serde_json::Value;
use std::collections::HashMap;

/// Stores every value published to each topic, in publish order.
///
/// Topics come into existence on first publish. Publishing a null value
/// creates the topic without recording anything, so a topic can be listable
/// while having no current value.
#[derive(Debug, Default)]
pub struct TopicStore {
    topics: HashMap<String, Vec<Value>>,
}

impl TopicStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` under `topic`, creating the topic if needed.
    ///
    /// Null values are never appended to a history.
    pub fn put(&mut self, topic: &str, value: Value) {
        match self.topics.get_mut(topic) {
            Some(history) => {
                if !value.is_null() {
                    history.push(value);
                }
            }
            None => {
                tracing::debug!("New topic: {}", topic);
                let history = if value.is_null() {
                    Vec::new()
                } else {
                    vec![value]
                };
                self.topics.insert(topic.to_string(), history);
            }
        }
    }

    /// Returns the current value for a query topic.
    ///
    /// A stored topic matches when it is a prefix of `query`. The scan
    /// returns the most recent value of the first matching topic that has
    /// recorded at least one value; matching topics with empty histories
    /// are skipped.
    pub fn current_for(&self, query: &str) -> Option<&Value> {
        for (stored, history) in &self.topics {
            if query.starts_with(stored.as_str()) {
                if let Some(value) = history.last() {
                    return Some(value);
                }
            }
        }
        None
    }

    /// All topic names, in arbitrary order.
    pub fn topic_names(&self) -> Vec<&str> {
        self.topics.keys().map(String::as_str).collect()
    }

    /// Full value history for an exact topic name.
    pub fn history(&self, topic: &str) -> Option<&[Value]> {
        self.topics.get(topic).map(Vec::as_slice)
    }

    /// Number of known topics, including ones with empty histories.
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}
