// Barchart - Rolling bucketed aggregates for dashboards
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Correction operations
//!
//! Manual fixes applied by an operator: setting a meter's reference value,
//! overwriting one stored bucket, and clearing data. Each operation validates
//! everything before its first write.

use tracing::info;

use crate::error::{ChartError, Result};
use crate::kv::KeyValueStore;
use crate::store::AggregationStore;
use crate::timekey::BucketKey;

/// Set `topic`'s last meter reading without touching its buckets.
///
/// Returns the info line reported to the host.
pub fn set_meter_value<S: KeyValueStore>(
    store: &mut AggregationStore<S>,
    topic: &str,
    value: f64,
) -> Result<String> {
    if topic.is_empty() {
        return Err(ChartError::MissingTopic {
            action: "set the new meter value",
        });
    }
    if !value.is_finite() {
        return Err(ChartError::InvalidMeterValue);
    }

    store.set_last(topic, value);
    info!(topic, value, "meter value set");
    Ok(format!("new meter value is {} for {}", value, topic))
}

/// Resolve a Python-style index (negative counts from the end) into `0..len`
pub fn resolve_index(index: i64, len: usize) -> Result<usize> {
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let resolved = if index < 0 { len_i + index } else { index };
    if resolved < 0 || resolved >= len_i {
        return Err(ChartError::IndexOutOfRange { index, len });
    }
    Ok(resolved as usize)
}

/// Overwrite the bucket at position `index` of `topic`'s stored buckets.
///
/// Positions follow time order of the stored keys, not the window. When
/// `meter_mode` is set and `new_meter_value` is given, the last meter reading
/// is replaced too. Returns the key that was overwritten.
pub fn overwrite_value<S: KeyValueStore>(
    store: &mut AggregationStore<S>,
    topic: &str,
    index: i64,
    new_value: f64,
    new_meter_value: Option<f64>,
    meter_mode: bool,
) -> Result<BucketKey> {
    let mut buckets = store.buckets(topic).ok_or_else(|| ChartError::NoData {
        topic: topic.to_string(),
    })?;
    if !new_value.is_finite() {
        return Err(ChartError::InvalidNewValue);
    }

    let position = resolve_index(index, buckets.len())?;
    let key = buckets
        .keys()
        .nth(position)
        .cloned()
        .ok_or(ChartError::IndexOutOfRange {
            index,
            len: buckets.len(),
        })?;

    buckets.insert(key.clone(), new_value);
    store.set_buckets(topic, &buckets);

    if let Some(meter_value) = new_meter_value.filter(|v| meter_mode && v.is_finite()) {
        store.set_last(topic, meter_value);
    }

    info!(topic, bucket = %key, value = new_value, "bucket overwritten");
    Ok(key)
}

/// Clear one topic, or every topic when `topic` is empty.
///
/// A named topic leaves the registry only while other topics remain; the
/// last registered topic stays registered with empty data. Returns the info
/// line reported to the host.
pub fn clear<S: KeyValueStore>(store: &mut AggregationStore<S>, topic: &str) -> String {
    if topic.is_empty() {
        let cleared = store.topics().len();
        store.clear_all();
        info!(topics = cleared, "all data cleared");
    } else {
        store.clear_topic(topic);
        let topics = store.topics();
        if topics.len() > 1 {
            store.remove_topic(topic);
        }
        info!(topic, "topic data cleared");
    }
    format!("data cleared {}", topic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use crate::store::BucketMap;

    fn seeded(topics: &[&str]) -> AggregationStore<MemoryStore> {
        let mut store = AggregationStore::new(MemoryStore::new());
        for topic in topics {
            store.add_topic(topic);
            store.set_buckets(
                topic,
                &BucketMap::from([
                    ("2024050100".to_string(), 1.0),
                    ("2024050101".to_string(), 2.0),
                    ("2024050102".to_string(), 3.0),
                ]),
            );
            store.set_last(topic, 50.0);
        }
        store
    }

    #[test]
    fn test_resolve_index() {
        assert_eq!(resolve_index(0, 3).unwrap(), 0);
        assert_eq!(resolve_index(2, 3).unwrap(), 2);
        assert_eq!(resolve_index(-1, 3).unwrap(), 2);
        assert_eq!(resolve_index(-3, 3).unwrap(), 0);
        assert!(matches!(
            resolve_index(3, 3),
            Err(ChartError::IndexOutOfRange { index: 3, len: 3 })
        ));
        assert!(resolve_index(-4, 3).is_err());
        assert!(resolve_index(0, 0).is_err());
    }

    #[test]
    fn test_set_meter_value() {
        let mut store = seeded(&["m"]);
        let info = set_meter_value(&mut store, "m", 123.45).unwrap();
        assert_eq!(info, "new meter value is 123.45 for m");
        assert_eq!(store.last("m"), Some(123.45));
        assert_eq!(store.buckets("m").unwrap().len(), 3);

        assert!(matches!(
            set_meter_value(&mut store, "", 1.0),
            Err(ChartError::MissingTopic { .. })
        ));
    }

    #[test]
    fn test_overwrite_last_bucket() {
        let mut store = seeded(&["t"]);
        let key = overwrite_value(&mut store, "t", -1, 9.0, None, false).unwrap();
        assert_eq!(key, "2024050102");
        assert_eq!(store.buckets("t").unwrap()["2024050102"], 9.0);
    }

    #[test]
    fn test_overwrite_sets_meter_only_in_meter_mode() {
        let mut store = seeded(&["t"]);
        overwrite_value(&mut store, "t", 0, 0.5, Some(70.0), false).unwrap();
        assert_eq!(store.last("t"), Some(50.0));

        overwrite_value(&mut store, "t", 0, 0.5, Some(70.0), true).unwrap();
        assert_eq!(store.last("t"), Some(70.0));
    }

    #[test]
    fn test_overwrite_failures_leave_state() {
        let mut store = seeded(&["t"]);
        assert!(matches!(
            overwrite_value(&mut store, "missing", 0, 1.0, None, false),
            Err(ChartError::NoData { .. })
        ));
        assert!(matches!(
            overwrite_value(&mut store, "t", 5, 1.0, Some(1.0), true),
            Err(ChartError::IndexOutOfRange { .. })
        ));
        assert_eq!(store.buckets("t").unwrap()["2024050100"], 1.0);
        assert_eq!(store.last("t"), Some(50.0));
    }

    #[test]
    fn test_clear_all_topics() {
        let mut store = seeded(&["a", "b"]);
        assert_eq!(clear(&mut store, ""), "data cleared ");
        assert!(store.topics().is_empty());
        assert!(store.buckets("a").unwrap().is_empty());
        assert_eq!(store.last("b"), None);
    }

    #[test]
    fn test_clear_one_of_many() {
        let mut store = seeded(&["a", "b"]);
        clear(&mut store, "a");
        assert_eq!(store.topics(), vec!["b"]);
        assert!(store.buckets("a").unwrap().is_empty());
        assert_eq!(store.buckets("b").unwrap().len(), 3);
    }

    #[test]
    fn test_clear_only_topic_keeps_registration() {
        let mut store = seeded(&["a"]);
        clear(&mut store, "a");
        assert_eq!(store.topics(), vec!["a"]);
        assert!(store.buckets("a").unwrap().is_empty());
        assert_eq!(store.last("a"), None);
    }
}
