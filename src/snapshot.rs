// Barchart - Rolling bucketed aggregates for dashboards
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Snapshot codec
//!
//! Every chart message doubles as a snapshot: besides the rendered series it
//! carries the window keys, per-topic sample counts and last meter readings.
//! Feeding such a message back in (anything with `bar_keys`) restores the
//! store after a restart. The store has no other durability path.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::command::{number_of, InboundEvent};
use crate::config::{ChartConfig, Granularity, Strategy};
use crate::error::{ChartError, Result};
use crate::kv::KeyValueStore;
use crate::output::ChartOutput;
use crate::store::{last_key, AggregationStore, BucketMap, SampleCounter};
use crate::timekey::BucketKey;
use crate::window::Window;

/// Rendered chart for one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub series: Vec<String>,
    pub data: Vec<Vec<f64>>,
}

/// Node settings echoed on every chart message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub unit: String,
    pub x_interval: Granularity,
    pub x_size: usize,
    pub precision: u32,
    pub is_meter_reading: bool,
    pub agg_by: Strategy,
    pub prevent_negative: bool,
}

impl From<&ChartConfig> for Settings {
    fn from(config: &ChartConfig) -> Self {
        Self {
            unit: config.unit.clone(),
            x_interval: config.x_interval,
            x_size: config.x_size,
            precision: config.precision,
            is_meter_reading: config.is_meter_reading,
            agg_by: config.agg_by,
            prevent_negative: config.prevent_negative,
        }
    }
}

/// Outbound chart message, restorable as a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartMessage {
    /// Topic of the event that produced this message
    pub topic: String,
    pub payload: Vec<ChartData>,
    /// Window keys, oldest first
    pub bar_keys: Vec<BucketKey>,
    /// Samples in the newest bucket, per topic
    pub data_counter: Vec<u64>,
    pub topics: Vec<String>,
    pub data_min: f64,
    pub data_max: f64,
    pub data_sum: f64,
    pub settings: Settings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    /// `<topic>_last` fields, one per topic with a meter reading
    #[serde(flatten)]
    pub last_values: BTreeMap<String, f64>,
}

impl ChartMessage {
    /// Capture the store's state for `window`
    pub fn capture<S: KeyValueStore>(
        store: &AggregationStore<S>,
        window: &Window,
        output: ChartOutput,
        settings: Settings,
        topic: &str,
    ) -> Self {
        let newest = window.current_key();
        let data_counter = output
            .series
            .iter()
            .map(|t| {
                newest
                    .and_then(|key| store.counter(t).get(key).copied())
                    .unwrap_or(0)
            })
            .collect();
        let last_values = output
            .series
            .iter()
            .filter_map(|t| store.last(t).map(|v| (last_key(t), v)))
            .collect();

        Self {
            topic: topic.to_string(),
            payload: vec![ChartData {
                labels: window.labels().to_vec(),
                series: output.series.clone(),
                data: output.data,
            }],
            bar_keys: window.keys().to_vec(),
            data_counter,
            topics: output.series,
            data_min: output.min,
            data_max: output.max,
            data_sum: output.sum,
            settings,
            info: None,
            last_values,
        }
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    /// Last meter reading carried for `topic`
    pub fn last_value(&self, topic: &str) -> Option<f64> {
        self.last_values.get(&last_key(topic)).copied()
    }

    /// Series of `topic`, aligned to `bar_keys`
    pub fn series(&self, topic: &str) -> Option<&[f64]> {
        let chart = self.payload.first()?;
        let index = chart.series.iter().position(|t| t == topic)?;
        chart.data.get(index).map(Vec::as_slice)
    }
}

/// Sample counter as carried by a snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum CounterSnapshot {
    /// Count of the newest bucket
    Count(u64),
    /// Full key → count map, as written by older hosts
    Buckets(SampleCounter),
}

/// Decoded restore request
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreSnapshot {
    pub bar_keys: Vec<BucketKey>,
    pub topics: Vec<String>,
    /// Per topic, values aligned to `bar_keys`; `None` leaves the bucket absent
    pub data: Vec<Vec<Option<f64>>>,
    pub data_counter: Vec<CounterSnapshot>,
    /// Last meter reading per topic
    pub last_values: BTreeMap<String, f64>,
    /// Shared `last` field of single-topic snapshots
    pub legacy_last: Option<f64>,
}

impl RestoreSnapshot {
    /// Decode the restore fields of an inbound event.
    ///
    /// Without a `topics` field the event's own `topic` names the only series.
    pub fn decode(event: &InboundEvent) -> Result<Self> {
        let bar_keys = event
            .bar_keys
            .clone()
            .ok_or_else(|| ChartError::MalformedSnapshot("bar_keys is missing".to_string()))?;

        let topics = match &event.topics {
            Some(topics) => topics.clone(),
            None if event.topic.is_empty() => {
                return Err(ChartError::MissingTopic {
                    action: "restore a single-topic snapshot",
                })
            }
            None => vec![event.topic.clone()],
        };

        let data = decode_series(&event.payload)?;
        let data_counter = event
            .data_counter
            .iter()
            .flatten()
            .map(decode_counter)
            .collect();

        let last_values = topics
            .iter()
            .filter_map(|t| {
                event
                    .extra
                    .get(&last_key(t))
                    .and_then(number_of)
                    .map(|v| (t.clone(), v))
            })
            .collect();
        let legacy_last = event.extra.get("last").and_then(number_of);

        Ok(Self {
            bar_keys,
            topics,
            data,
            data_counter,
            last_values,
            legacy_last,
        })
    }

    /// Replace the store's state with this snapshot.
    ///
    /// Topics missing from the snapshot keep their keys in the store but
    /// leave the registry.
    pub fn restore<S: KeyValueStore>(&self, store: &mut AggregationStore<S>) {
        for (i, topic) in self.topics.iter().enumerate() {
            let series = self.data.get(i).map(Vec::as_slice).unwrap_or(&[]);
            let buckets: BucketMap = self
                .bar_keys
                .iter()
                .zip(series)
                .filter_map(|(key, value)| value.map(|v| (key.clone(), v)))
                .collect();
            store.set_buckets(topic, &buckets);

            let counter = match self.data_counter.get(i) {
                Some(CounterSnapshot::Count(count)) if *count > 0 => self
                    .bar_keys
                    .last()
                    .map(|key| SampleCounter::from([(key.clone(), *count)]))
                    .unwrap_or_default(),
                Some(CounterSnapshot::Buckets(counter)) => counter.clone(),
                _ => SampleCounter::new(),
            };
            store.set_counter(topic, &counter);

            if let Some(last) = self.last_values.get(topic).copied().or(self.legacy_last) {
                store.set_last(topic, last);
            }
        }
        store.set_topics(&self.topics);

        info!(
            topics = self.topics.len(),
            buckets = self.bar_keys.len(),
            "data restored"
        );
    }
}

impl From<&ChartMessage> for RestoreSnapshot {
    fn from(message: &ChartMessage) -> Self {
        let data = message
            .payload
            .first()
            .map(|chart| {
                chart
                    .data
                    .iter()
                    .map(|series| series.iter().copied().map(Some).collect())
                    .collect()
            })
            .unwrap_or_default();
        let last_values = message
            .topics
            .iter()
            .filter_map(|t| message.last_value(t).map(|v| (t.clone(), v)))
            .collect();

        Self {
            bar_keys: message.bar_keys.clone(),
            topics: message.topics.clone(),
            data,
            data_counter: message
                .data_counter
                .iter()
                .copied()
                .map(CounterSnapshot::Count)
                .collect(),
            last_values,
            legacy_last: None,
        }
    }
}

/// `payload[0].data` of a snapshot
fn decode_series(payload: &Value) -> Result<Vec<Vec<Option<f64>>>> {
    let chart = payload
        .as_array()
        .and_then(|charts| charts.first())
        .ok_or_else(|| ChartError::MalformedSnapshot("payload must be a chart array".to_string()))?;

    let series = match chart.get("data") {
        Some(Value::Array(series)) => series,
        Some(Value::Null) | None => return Ok(Vec::new()),
        Some(_) => {
            return Err(ChartError::MalformedSnapshot(
                "payload[0].data must be an array".to_string(),
            ))
        }
    };

    series
        .iter()
        .enumerate()
        .map(|(i, values)| match values {
            Value::Array(values) => Ok(values.iter().map(number_of).collect()),
            Value::Null => Ok(Vec::new()),
            _ => Err(ChartError::MalformedSnapshot(format!(
                "payload[0].data[{}] must be an array",
                i
            ))),
        })
        .collect()
}

fn decode_counter(value: &Value) -> CounterSnapshot {
    match value {
        Value::Object(entries) => CounterSnapshot::Buckets(
            entries
                .iter()
                .filter_map(|(key, count)| {
                    number_of(count)
                        .filter(|c| *c >= 0.0)
                        .map(|c| (key.clone(), c.round() as u64))
                })
                .collect(),
        ),
        other => CounterSnapshot::Count(
            number_of(other)
                .filter(|c| *c >= 0.0)
                .map_or(0, |c| c.round() as u64),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use crate::output::OutputBuilder;
    use chrono::NaiveDate;
    use serde_json::json;

    fn event(value: Value) -> InboundEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_decode_multi_topic() {
        let snapshot = RestoreSnapshot::decode(&event(json!({
            "topic": "",
            "payload": [{"labels": ["00", "01"], "series": ["a", "b"], "data": [[1, 2], [3]]}],
            "bar_keys": ["2024050100", "2024050101"],
            "topics": ["a", "b"],
            "data_counter": [2, {"2024050101": 5}],
            "a_last": 10.5,
            "b_last": "7"
        })))
        .unwrap();

        assert_eq!(snapshot.topics, vec!["a", "b"]);
        assert_eq!(snapshot.data[0], vec![Some(1.0), Some(2.0)]);
        assert_eq!(snapshot.data_counter[0], CounterSnapshot::Count(2));
        assert!(matches!(snapshot.data_counter[1], CounterSnapshot::Buckets(_)));
        assert_eq!(snapshot.last_values.get("a"), Some(&10.5));
        assert_eq!(snapshot.last_values.get("b"), Some(&7.0));
    }

    #[test]
    fn test_decode_legacy_single_topic() {
        let snapshot = RestoreSnapshot::decode(&event(json!({
            "topic": "power",
            "payload": [{"data": [[4, 5, 6]]}],
            "bar_keys": ["k1", "k2", "k3"],
            "last": 1200
        })))
        .unwrap();

        assert_eq!(snapshot.topics, vec!["power"]);
        assert_eq!(snapshot.legacy_last, Some(1200.0));
        assert!(snapshot.data_counter.is_empty());
    }

    #[test]
    fn test_decode_rejects_bad_payload() {
        let result = RestoreSnapshot::decode(&event(json!({
            "topic": "a",
            "payload": "nope",
            "bar_keys": ["k1"]
        })));
        assert!(matches!(result, Err(ChartError::MalformedSnapshot(_))));
    }

    #[test]
    fn test_restore_zips_keys_and_replaces_registry() {
        let mut store = AggregationStore::new(MemoryStore::new());
        store.add_topic("old");

        let snapshot = RestoreSnapshot {
            bar_keys: vec!["k1".into(), "k2".into(), "k3".into()],
            topics: vec!["a".into(), "b".into()],
            data: vec![vec![Some(1.0), None, Some(3.0)]],
            data_counter: vec![CounterSnapshot::Count(4)],
            last_values: BTreeMap::new(),
            legacy_last: Some(99.0),
        };
        snapshot.restore(&mut store);

        assert_eq!(store.topics(), vec!["a", "b"]);
        let a = store.buckets("a").unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a.get("k3"), Some(&3.0));
        assert!(store.buckets("b").unwrap().is_empty());
        assert_eq!(store.counter("a").get("k3"), Some(&4));
        assert!(store.counter("b").is_empty());
        assert_eq!(store.last("a"), Some(99.0));
        assert_eq!(store.last("b"), Some(99.0));
    }

    fn capture_window() -> Window {
        let at = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        Window::build(at, 3, Granularity::Hours).unwrap()
    }

    fn capture(store: &AggregationStore<MemoryStore>) -> ChartMessage {
        let window = capture_window();
        let output = OutputBuilder::new(0).build(store, &window);
        let settings = Settings::from(&ChartConfig::default());
        ChartMessage::capture(store, &window, output, settings, "a")
    }

    fn non_zero(buckets: BucketMap) -> BucketMap {
        buckets.into_iter().filter(|(_, v)| *v != 0.0).collect()
    }

    #[test]
    fn test_captured_message_restores_equivalent_state() {
        let mut source = AggregationStore::new(MemoryStore::new());
        source.add_topic("a");
        source.add_topic("b");
        source.set_buckets(
            "a",
            &BucketMap::from([("2024050100".to_string(), 1.5), ("2024050102".to_string(), 0.25)]),
        );
        source.set_last("a", 50.0);
        source.set_buckets("b", &BucketMap::from([("2024050102".to_string(), 6.0)]));
        source.set_counter("b", &SampleCounter::from([("2024050102".to_string(), 3)]));

        let message = capture(&source);
        let mut target = AggregationStore::new(MemoryStore::new());
        RestoreSnapshot::from(&message).restore(&mut target);

        assert_eq!(target.topics(), source.topics());
        for topic in ["a", "b"] {
            // Rendered zeros come back as explicit zero buckets
            let restored = target.buckets(topic).unwrap();
            assert_eq!(restored.len(), 3);
            assert_eq!(non_zero(restored), non_zero(source.buckets(topic).unwrap()));
            assert_eq!(target.counter(topic), source.counter(topic));
            assert_eq!(target.last(topic), source.last(topic));
        }

        // Restoring the restored state again changes nothing
        let again = capture(&target);
        assert_eq!(again, message);
        let mut second = AggregationStore::new(MemoryStore::new());
        RestoreSnapshot::from(&again).restore(&mut second);
        assert_eq!(second.buckets("a"), target.buckets("a"));
        assert_eq!(second.counter("b"), target.counter("b"));
    }

    #[test]
    fn test_chart_message_wire_shape() {
        let message = ChartMessage {
            topic: "a".into(),
            payload: vec![ChartData {
                labels: vec!["01".into()],
                series: vec!["a".into()],
                data: vec![vec![2.0]],
            }],
            bar_keys: vec!["2024050101".into()],
            data_counter: vec![0],
            topics: vec!["a".into()],
            data_min: 2.0,
            data_max: 2.0,
            data_sum: 2.0,
            settings: Settings::from(&ChartConfig::default()),
            info: None,
            last_values: BTreeMap::from([("a_last".to_string(), 41.0)]),
        };

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["a_last"], json!(41.0));
        assert_eq!(value["settings"]["x_interval"], json!("hours"));
        assert_eq!(value["settings"]["agg_by"], json!("sum"));
        assert!(value.get("info").is_none());

        let back: ChartMessage = serde_json::from_value(value).unwrap();
        assert_eq!(back, message);
        assert_eq!(back.series("a"), Some(&[2.0][..]));
    }
}
