//! Aggregation engine
//!
//! Folds one reading into the current bucket of a topic:
//!
//! 1. rebuild the window and evict every stored bucket outside it
//! 2. combine the current bucket's value with the reading
//! 3. reject the reading if the result is not finite
//! 4. register the topic and write the buckets (and, for averages, the
//!    counter) back
//!
//! The window is derived from the reading's own timestamp. A late reading
//! lands in its historical bucket, and evicts whatever lies outside the
//! window that timestamp defines, newer buckets included.

use chrono::NaiveDateTime;
use tracing::debug;

use crate::config::{ChartConfig, Granularity, Strategy};
use crate::error::{ChartError, Result};
use crate::kv::KeyValueStore;
use crate::output::round_to;
use crate::store::{AggregationStore, SampleCounter};
use crate::window::Window;

/// Decimals kept by the sum strategy to stop float drift from accumulating
pub const SUM_DECIMALS: u32 = 8;

/// Fold `reading` into a bucket currently holding `old`.
///
/// `old_count` is the number of samples already folded into the bucket and
/// only matters for [`Strategy::Avg`]. An absent `old` seeds both `min` and
/// `max` with the reading.
pub fn combine(strategy: Strategy, old: Option<f64>, reading: f64, old_count: u64) -> f64 {
    match strategy {
        Strategy::Sum => round_to(old.unwrap_or(0.0) + reading, SUM_DECIMALS),
        Strategy::Min => old.unwrap_or(reading).min(reading),
        Strategy::Max => old.unwrap_or(reading).max(reading),
        Strategy::Avg => {
            let weight = old_count as f64;
            (old.unwrap_or(0.0) * weight + reading) / (weight + 1.0)
        }
    }
}

/// Windowed aggregation for one node configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationEngine {
    granularity: Granularity,
    window_size: usize,
    strategy: Strategy,
}

impl AggregationEngine {
    pub fn new(granularity: Granularity, window_size: usize, strategy: Strategy) -> Self {
        Self {
            granularity,
            window_size,
            strategy,
        }
    }

    pub fn from_config(config: &ChartConfig) -> Self {
        Self::new(config.x_interval, config.x_size, config.agg_by)
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Window ending at the bucket containing `at`
    pub fn window(&self, at: NaiveDateTime) -> Result<Window> {
        Window::build(at, self.window_size, self.granularity)
    }

    /// Fold `reading` into `topic`'s bucket for `at`; returns the bucket's new value
    pub fn apply<S: KeyValueStore>(
        &self,
        store: &mut AggregationStore<S>,
        topic: &str,
        reading: f64,
        at: NaiveDateTime,
    ) -> Result<f64> {
        if !reading.is_finite() {
            return Err(ChartError::InvalidReading {
                topic: topic.to_string(),
                payload: reading.to_string(),
            });
        }

        // Build the window before touching the store so a bad timestamp writes nothing
        let window = self.window(at)?;
        let cur_key = window
            .current_key()
            .cloned()
            .ok_or_else(|| ChartError::InvalidConfig("x_size must be at least 1".to_string()))?;

        let mut buckets = store.buckets(topic).unwrap_or_default();
        let before = buckets.len();
        buckets.retain(|key, _| window.contains(key));
        let evicted = before - buckets.len();

        let old = buckets.get(&cur_key).copied();
        let (new_value, counter) = match self.strategy {
            Strategy::Avg => {
                let old_count = store.counter(topic).get(&cur_key).copied().unwrap_or(0);
                let value = combine(Strategy::Avg, old, reading, old_count);
                // Only the current bucket's count is kept
                (value, Some(SampleCounter::from([(cur_key.clone(), old_count + 1)])))
            }
            strategy => (combine(strategy, old, reading, 0), None),
        };
        if !new_value.is_finite() {
            return Err(ChartError::ValueOverflow {
                topic: topic.to_string(),
                key: cur_key,
            });
        }

        store.add_topic(topic);
        if let Some(counter) = counter {
            store.set_counter(topic, &counter);
        }
        buckets.insert(cur_key.clone(), new_value);
        store.set_buckets(topic, &buckets);

        debug!(
            topic,
            bucket = %cur_key,
            reading,
            value = new_value,
            evicted,
            "reading applied"
        );
        Ok(new_value)
    }
}
