//! Per topic-partition record of the highest offset handed to the message handler.
//!
//! The broker delivers at least once: after a rebalance or a reconnect it may
//! replay messages at or before the last offset this process already handled.
//! [`OffsetTracker`] turns that into best-effort exactly-once delivery for the
//! lifetime of one session. Nothing is persisted, so a new session starts from
//! an empty table.

use std::collections::HashMap;

/// In-memory table of `topic -> partition -> last delivered offset`
#[derive(Debug, Clone, Default)]
pub struct OffsetTracker {
    topics: HashMap<String, HashMap<i32, i64>>,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tracker with an empty entry for each of the given topics
    pub fn with_topics<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tracker = Self::new();
        for topic in topics {
            tracker.register_topic(topic);
        }
        tracker
    }

    /// Add an empty entry for `topic` without touching existing partitions
    pub fn register_topic(&mut self, topic: impl Into<String>) {
        self.topics.entry(topic.into()).or_default();
    }

    /// Whether a message at `offset` has not been delivered yet
    ///
    /// The first message seen for a topic-partition is always delivered,
    /// including offset 0 and topics that were never registered.
    pub fn should_deliver(&self, topic: &str, partition: i32, offset: i64) -> bool {
        match self.last_delivered(topic, partition) {
            Some(last) => offset > last,
            None => true,
        }
    }

    /// Store `offset` as the last delivered offset of the topic-partition
    ///
    /// Overwrites unconditionally. Only call this after [`Self::should_deliver`]
    /// returned true for the same message, otherwise the stored offset can move
    /// backwards.
    pub fn record(&mut self, topic: &str, partition: i32, offset: i64) {
        // Avoid allocating the topic name on the hot path once the entry exists
        match self.topics.get_mut(topic) {
            Some(partitions) => {
                partitions.insert(partition, offset);
            }
            None => {
                self.topics
                    .entry(topic.to_string())
                    .or_default()
                    .insert(partition, offset);
            }
        }
    }

    pub fn last_delivered(&self, topic: &str, partition: i32) -> Option<i64> {
        self.topics
            .get(topic)
            .and_then(|partitions| partitions.get(&partition))
            .copied()
    }

    /// Topics with an entry, registered or seen
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }

    /// Partitions of `topic` with a recorded offset, sorted
    pub fn partitions(&self, topic: &str) -> Vec<i32> {
        let mut partitions: Vec<i32> = self
            .topics
            .get(topic)
            .map(|p| p.keys().copied().collect())
            .unwrap_or_default();
        partitions.sort_unstable();
        partitions
    }

    /// True when no offset has been recorded for any partition
    pub fn is_empty(&self) -> bool {
        self.topics.values().all(HashMap::is_empty)
    }
}
