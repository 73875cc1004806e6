use std::collections::HashMap;

use crate::{connection::ConnectionId, protocol::Qos};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscriber {
    pub connection: ConnectionId,
    pub granted_qos: Qos,
}

/// Topic filter to subscribers, exact match only.
///
/// Subscribers of a filter are kept in subscription order.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    topics: HashMap<String, Vec<Subscriber>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `connection` to `topic_filter`. A connection subscribing again to the same filter
    /// keeps its place and gets the new granted `QoS`.
    pub fn subscribe(&mut self, topic_filter: &str, connection: ConnectionId, granted_qos: Qos) {
        let subscribers = self.topics.entry(topic_filter.to_string()).or_default();

        match subscribers.iter_mut().find(|subscriber| subscriber.connection == connection) {
            Some(subscriber) => subscriber.granted_qos = granted_qos,
            None => subscribers.push(Subscriber { connection, granted_qos }),
        }
    }

    /// Returns whether an entry was removed.
    pub fn unsubscribe(&mut self, topic_filter: &str, connection: ConnectionId) -> bool {
        let Some(subscribers) = self.topics.get_mut(topic_filter) else {
            return false;
        };

        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.connection != connection);
        let removed = subscribers.len() != before;

        if subscribers.is_empty() {
            self.topics.remove(topic_filter);
        }

        removed
    }

    /// Drops every entry of `connection`, returning how many were removed.
    pub fn remove_connection(&mut self, connection: ConnectionId) -> usize {
        let mut removed = 0;

        self.topics.retain(|_, subscribers| {
            let before = subscribers.len();
            subscribers.retain(|subscriber| subscriber.connection != connection);
            removed += before - subscribers.len();

            !subscribers.is_empty()
        });

        removed
    }

    pub fn subscribers(&self, topic_name: &str) -> &[Subscriber] {
        self.topics.get(topic_name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of filters with at least one subscriber.
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: u64) -> ConnectionId {
        ConnectionId::new(value)
    }

    #[test]
    fn keeps_subscription_order() {
        let mut table = SubscriptionTable::new();
        table.subscribe("t", id(2), Qos::AtMostOnce);
        table.subscribe("t", id(1), Qos::AtLeastOnce);
        table.subscribe("t", id(2), Qos::ExactlyOnce);

        assert_eq!(
            table.subscribers("t"),
            &[
                Subscriber { connection: id(2), granted_qos: Qos::ExactlyOnce },
                Subscriber { connection: id(1), granted_qos: Qos::AtLeastOnce },
            ]
        );
        assert!(table.subscribers("t/other").is_empty());
    }

    #[test]
    fn unsubscribe_prunes_empty_filters() {
        let mut table = SubscriptionTable::new();
        table.subscribe("a", id(1), Qos::AtMostOnce);

        assert!(!table.unsubscribe("a", id(2)));
        assert!(table.unsubscribe("a", id(1)));
        assert!(!table.unsubscribe("a", id(1)));
        assert!(table.is_empty());
    }

    #[test]
    fn removes_every_entry_of_a_connection() {
        let mut table = SubscriptionTable::new();
        table.subscribe("a", id(1), Qos::AtMostOnce);
        table.subscribe("b", id(1), Qos::AtMostOnce);
        table.subscribe("b", id(2), Qos::AtMostOnce);

        assert_eq!(table.remove_connection(id(1)), 2);
        assert_eq!(table.len(), 1);
        assert_eq!(table.subscribers("b").len(), 1);
    }
}
