//! Subscription registry: topic patterns mapped to subscribed connections.

use hubbub_protocol::WireFormat;
use std::collections::HashMap;
use std::fmt;

/// Broker-assigned connection identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maps each subscribed topic pattern to the connections registered under
/// it, together with the wire format each connection negotiated.
///
/// Delivery resolution is substring-based: a published topic reaches every
/// pattern that occurs within the topic string. This is a different
/// relation from the topic store's prefix rule, and the two are kept
/// separate on purpose.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscriptions: HashMap<String, Vec<(ConnId, WireFormat)>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `conn` under `pattern`. Registering an already-present
    /// (connection, format) pair is a no-op.
    pub fn subscribe(&mut self, pattern: &str, conn: ConnId, format: WireFormat) {
        let subscribers = self.subscriptions.entry(pattern.to_string()).or_default();
        if !subscribers.contains(&(conn, format)) {
            subscribers.push((conn, format));
            tracing::debug!("Connection {} subscribed to '{}' ({})", conn, pattern, format);
        }
    }

    /// Drops `conn`'s registration under exactly `pattern`.
    ///
    /// The pattern key itself survives with an empty subscriber list;
    /// only [`remove_connection`](Self::remove_connection) prunes keys.
    pub fn unsubscribe(&mut self, pattern: &str, conn: ConnId) {
        if let Some(subscribers) = self.subscriptions.get_mut(pattern) {
            subscribers.retain(|(subscriber, _)| *subscriber != conn);
            tracing::debug!("Connection {} unsubscribed from '{}'", conn, pattern);
        }
    }

    /// Returns the connections a published topic must be delivered to:
    /// every subscriber of every pattern that occurs within `topic`.
    pub fn resolve(&self, topic: &str) -> Vec<(ConnId, WireFormat)> {
        let mut matched = Vec::new();
        for (pattern, subscribers) in &self.subscriptions {
            if topic.contains(pattern.as_str()) {
                matched.extend(subscribers.iter().copied());
            }
        }
        matched
    }

    /// Removes every registration held by `conn`, dropping patterns left
    /// with no subscribers.
    pub fn remove_connection(&mut self, conn: ConnId) {
        self.subscriptions.retain(|_, subscribers| {
            subscribers.retain(|(subscriber, _)| *subscriber != conn);
            !subscribers.is_empty()
        });
    }

    /// Flattened (pattern, connection) pairs over all registrations,
    /// sorted for deterministic listing.
    pub fn entries(&self) -> Vec<(String, ConnId)> {
        let mut entries = Vec::new();
        for (pattern, subscribers) in &self.subscriptions {
            for (conn, _) in subscribers {
                entries.push((pattern.clone(), *conn));
            }
        }
        entries.sort();
        entries
    }

    /// Total number of (pattern, connection) registrations.
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONN_1: ConnId = ConnId(1);
    const CONN_2: ConnId = ConnId(2);

    #[test]
    fn test_subscribe_and_resolve_exact() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("weather", CONN_1, WireFormat::Json);

        let matched = registry.resolve("weather");
        assert_eq!(matched, vec![(CONN_1, WireFormat::Json)]);
    }

    #[test]
    fn test_resolve_substring_pattern() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("eather", CONN_1, WireFormat::Xml);

        // "eather" occurs inside "weather".
        assert_eq!(registry.resolve("weather").len(), 1);
        // The reverse relation does not hold.
        assert!(registry.resolve("eat").is_empty());
    }

    #[test]
    fn test_resolve_collects_multiple_patterns() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("weather", CONN_1, WireFormat::Json);
        registry.subscribe("eat", CONN_2, WireFormat::Binary);

        let matched = registry.resolve("weather/lisbon");
        assert_eq!(matched.len(), 2);
        assert!(matched.contains(&(CONN_1, WireFormat::Json)));
        assert!(matched.contains(&(CONN_2, WireFormat::Binary)));
    }

    #[test]
    fn test_duplicate_subscribe_is_noop() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("news", CONN_1, WireFormat::Json);
        registry.subscribe("news", CONN_1, WireFormat::Json);

        assert_eq!(registry.subscriber_count(), 1);
        assert_eq!(registry.resolve("news").len(), 1);
    }

    #[test]
    fn test_two_connections_same_pattern() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("news", CONN_1, WireFormat::Json);
        registry.subscribe("news", CONN_2, WireFormat::Xml);

        let matched = registry.resolve("news");
        assert_eq!(matched.len(), 2);
    }

    #[test]
    fn test_unsubscribe_exact_pattern_only() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("a", CONN_1, WireFormat::Json);
        registry.subscribe("ab", CONN_1, WireFormat::Json);

        registry.unsubscribe("a", CONN_1);

        // The "ab" registration is untouched; resolving "ab" still matches it.
        assert_eq!(registry.resolve("ab"), vec![(CONN_1, WireFormat::Json)]);
        assert!(registry.resolve("a").is_empty());
    }

    #[test]
    fn test_unsubscribe_leaves_other_connections() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("news", CONN_1, WireFormat::Json);
        registry.subscribe("news", CONN_2, WireFormat::Xml);

        registry.unsubscribe("news", CONN_1);

        assert_eq!(registry.resolve("news"), vec![(CONN_2, WireFormat::Xml)]);
    }

    #[test]
    fn test_unsubscribe_unknown_pattern_is_noop() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("news", CONN_1, WireFormat::Json);
        registry.unsubscribe("sports", CONN_1);

        assert_eq!(registry.subscriber_count(), 1);
    }

    #[test]
    fn test_remove_connection_prunes_empty_patterns() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("a", CONN_1, WireFormat::Json);
        registry.subscribe("a", CONN_2, WireFormat::Json);
        registry.subscribe("b", CONN_1, WireFormat::Json);

        registry.remove_connection(CONN_1);

        assert_eq!(registry.entries(), vec![("a".to_string(), CONN_2)]);
        assert!(registry.resolve("b").is_empty());
        assert_eq!(registry.subscriber_count(), 1);
    }

    #[test]
    fn test_entries_flattened_and_sorted() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("b", CONN_2, WireFormat::Json);
        registry.subscribe("a", CONN_2, WireFormat::Xml);
        registry.subscribe("a", CONN_1, WireFormat::Json);

        assert_eq!(
            registry.entries(),
            vec![
                ("a".to_string(), CONN_1),
                ("a".to_string(), CONN_2),
                ("b".to_string(), CONN_2),
            ]
        );
    }

    #[test]
    fn test_empty_pattern_matches_everything() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("", CONN_1, WireFormat::Json);

        assert_eq!(registry.resolve("anything").len(), 1);
        assert_eq!(registry.resolve("").len(), 1);
    }
}
