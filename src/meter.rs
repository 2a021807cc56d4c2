//! Meter delta processing
//!
//! Cumulative meters (energy, water, gas) report an ever-growing absolute
//! value. Only the increment since the previous reading is aggregated.

use tracing::warn;

use crate::error::Warning;
use crate::kv::KeyValueStore;
use crate::store::AggregationStore;

/// Delta computed from an absolute meter reading
#[derive(Debug, Clone, PartialEq)]
pub struct MeterDelta {
    /// Value to feed into the aggregation engine
    pub delta: f64,
    /// Set when a negative delta was clamped to zero
    pub warning: Option<Warning>,
}

/// Converts absolute readings into deltas against each topic's last reading
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeterProcessor {
    prevent_negative: bool,
}

impl MeterProcessor {
    pub fn new(prevent_negative: bool) -> Self {
        Self { prevent_negative }
    }

    /// Increment of `absolute` over the topic's last reading.
    ///
    /// The very first reading of a topic yields a delta of zero. Nothing is
    /// written; call [`MeterProcessor::commit`] once the delta was applied.
    pub fn to_delta<S: KeyValueStore>(
        &self,
        store: &AggregationStore<S>,
        topic: &str,
        absolute: f64,
    ) -> MeterDelta {
        let last = store.last(topic).unwrap_or(absolute);

        let delta = absolute - last;
        if self.prevent_negative && delta < 0.0 {
            let warning = Warning::NegativeDeltaClamped {
                topic: topic.to_string(),
                last,
                reading: absolute,
            };
            warn!(topic, last, reading = absolute, "{}", warning);
            return MeterDelta {
                delta: 0.0,
                warning: Some(warning),
            };
        }

        MeterDelta {
            delta,
            warning: None,
        }
    }

    /// Make `absolute` the reference for the next reading
    pub fn commit<S: KeyValueStore>(
        &self,
        store: &mut AggregationStore<S>,
        topic: &str,
        absolute: f64,
    ) {
        store.set_last(topic, absolute);
    }
}
