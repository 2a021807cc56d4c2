//! Aggregation store
//!
//! Typed per-topic state on top of a [`KeyValueStore`]. Keys are namespaced
//! per topic:
//!
//! | key                    | content                               |
//! |------------------------|---------------------------------------|
//! | `<topic>_data`         | bucket key → value                    |
//! | `<topic>_data_counter` | bucket key → samples folded (avg)     |
//! | `<topic>_last`         | last absolute meter reading           |
//! | `topics`               | ordered topic registry                |
//!
//! There is no locking; one writer per topic is assumed.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::kv::KeyValueStore;
use crate::timekey::BucketKey;

/// Bucket values of one topic, ordered by key (and therefore by time)
pub type BucketMap = BTreeMap<BucketKey, f64>;

/// Samples folded into each bucket, used by the average strategy
pub type SampleCounter = BTreeMap<BucketKey, u64>;

/// Registry key
pub const TOPICS_KEY: &str = "topics";

fn data_key(topic: &str) -> String {
    format!("{}_data", topic)
}

fn counter_key(topic: &str) -> String {
    format!("{}_data_counter", topic)
}

/// Key of a topic's last meter reading, also the field name used on the wire
pub fn last_key(topic: &str) -> String {
    format!("{}_last", topic)
}

/// Per-topic aggregation state backed by an injected key-value port
#[derive(Debug)]
pub struct AggregationStore<S> {
    kv: S,
}

impl<S: KeyValueStore> AggregationStore<S> {
    pub fn new(kv: S) -> Self {
        Self { kv }
    }

    /// Underlying key-value port
    pub fn kv(&self) -> &S {
        &self.kv
    }

    pub fn kv_mut(&mut self) -> &mut S {
        &mut self.kv
    }

    pub fn into_inner(self) -> S {
        self.kv
    }

    // ------------------------------------------------------------------
    // Topic registry
    // ------------------------------------------------------------------

    /// Registered topics in series order
    pub fn topics(&self) -> Vec<String> {
        match self.kv.get(TOPICS_KEY) {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(topic) => Some(topic),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Append `topic` to the registry; returns `false` if it was already there
    pub fn add_topic(&mut self, topic: &str) -> bool {
        let mut topics = self.topics();
        if topics.iter().any(|t| t == topic) {
            return false;
        }
        topics.push(topic.to_string());
        self.set_topics(&topics);
        true
    }

    /// Remove `topic` from the registry; returns `false` if it was not there
    pub fn remove_topic(&mut self, topic: &str) -> bool {
        let mut topics = self.topics();
        let before = topics.len();
        topics.retain(|t| t != topic);
        if topics.len() == before {
            return false;
        }
        self.set_topics(&topics);
        true
    }

    /// Replace the registry wholesale
    pub fn set_topics(&mut self, topics: &[String]) {
        let items = topics.iter().cloned().map(Value::String).collect();
        self.kv.set(TOPICS_KEY, Value::Array(items));
    }

    // ------------------------------------------------------------------
    // Per-topic state
    // ------------------------------------------------------------------

    /// Bucket map of `topic`, `None` when the topic never stored data
    pub fn buckets(&self, topic: &str) -> Option<BucketMap> {
        match self.kv.get(&data_key(topic))? {
            Value::Object(entries) => Some(
                entries
                    .into_iter()
                    .filter_map(|(key, value)| value.as_f64().map(|v| (key, v)))
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn set_buckets(&mut self, topic: &str, buckets: &BucketMap) {
        let entries: Map<String, Value> = buckets
            .iter()
            .map(|(key, value)| (key.clone(), Value::from(*value)))
            .collect();
        self.kv.set(&data_key(topic), Value::Object(entries));
    }

    /// Sample counter of `topic`, empty when absent
    pub fn counter(&self, topic: &str) -> SampleCounter {
        match self.kv.get(&counter_key(topic)) {
            Some(Value::Object(entries)) => entries
                .into_iter()
                .filter_map(|(key, value)| count_of(&value).map(|c| (key, c)))
                .collect(),
            _ => SampleCounter::new(),
        }
    }

    pub fn set_counter(&mut self, topic: &str, counter: &SampleCounter) {
        let entries: Map<String, Value> = counter
            .iter()
            .map(|(key, count)| (key.clone(), Value::from(*count)))
            .collect();
        self.kv.set(&counter_key(topic), Value::Object(entries));
    }

    /// Last absolute meter reading of `topic`
    pub fn last(&self, topic: &str) -> Option<f64> {
        self.kv.get(&last_key(topic)).and_then(|v| v.as_f64())
    }

    pub fn set_last(&mut self, topic: &str, value: f64) {
        self.kv.set(&last_key(topic), Value::from(value));
    }

    /// Empty the data, counter and last reading of one topic.
    /// The registry is left untouched.
    pub fn clear_topic(&mut self, topic: &str) {
        self.kv.set(&data_key(topic), Value::Object(Map::new()));
        self.kv.set(&counter_key(topic), Value::Object(Map::new()));
        self.kv.set(&last_key(topic), Value::Null);
    }

    /// Empty every registered topic and the registry itself
    pub fn clear_all(&mut self) {
        for topic in self.topics() {
            self.clear_topic(&topic);
        }
        self.set_topics(&[]);
    }
}

/// Counts written by older hosts may arrive as floats
fn count_of(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v.round() as u64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use serde_json::json;

    fn store() -> AggregationStore<MemoryStore> {
        AggregationStore::new(MemoryStore::new())
    }

    #[test]
    fn test_registry_is_ordered_and_unique() {
        let mut store = store();
        assert!(store.add_topic("b"));
        assert!(store.add_topic("a"));
        assert!(!store.add_topic("b"));
        assert_eq!(store.topics(), vec!["b", "a"]);

        assert!(store.remove_topic("b"));
        assert!(!store.remove_topic("b"));
        assert_eq!(store.topics(), vec!["a"]);
    }

    #[test]
    fn test_buckets_roundtrip_through_kv() {
        let mut store = store();
        assert!(store.buckets("t").is_none());

        let mut buckets = BucketMap::new();
        buckets.insert("2024010101".to_string(), 12.5);
        buckets.insert("2024010100".to_string(), 3.0);
        store.set_buckets("t", &buckets);

        assert_eq!(store.kv().get("t_data"), Some(json!({"2024010100": 3.0, "2024010101": 12.5})));
        assert_eq!(store.buckets("t").unwrap(), buckets);
    }

    #[test]
    fn test_counter_accepts_legacy_values() {
        let mut store = store();
        assert!(store.counter("t").is_empty());

        store.kv_mut().set("t_data_counter", json!(0));
        assert!(store.counter("t").is_empty());

        store.kv_mut().set("t_data_counter", json!({"2024010101": 3.0}));
        assert_eq!(store.counter("t").get("2024010101"), Some(&3));
    }

    #[test]
    fn test_last_value() {
        let mut store = store();
        assert_eq!(store.last("meter"), None);
        store.set_last("meter", 1234.5);
        assert_eq!(store.last("meter"), Some(1234.5));
    }

    #[test]
    fn test_clear_topic_keeps_registry() {
        let mut store = store();
        store.add_topic("t");
        store.set_buckets("t", &BucketMap::from([("k".to_string(), 1.0)]));
        store.set_last("t", 9.0);

        store.clear_topic("t");
        assert!(store.buckets("t").unwrap().is_empty());
        assert!(store.counter("t").is_empty());
        assert_eq!(store.last("t"), None);
        assert_eq!(store.topics(), vec!["t"]);
    }

    #[test]
    fn test_clear_all() {
        let mut store = store();
        for topic in ["a", "b"] {
            store.add_topic(topic);
            store.set_buckets(topic, &BucketMap::from([("k".to_string(), 1.0)]));
            store.set_last(topic, 2.0);
        }

        store.clear_all();
        assert!(store.topics().is_empty());
        assert!(store.buckets("a").unwrap().is_empty());
        assert_eq!(store.last("b"), None);
    }
}
