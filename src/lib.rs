//! # Barchart - Rolling bucketed aggregates for dashboards
//!
//! Turns a stream of timestamped numeric readings into a fixed-size window of
//! time buckets, ready to feed a bar chart.
//!
//! ## Key Features
//!
//! - **Seven granularities**: seconds up to years, including quarter hours
//! - **Four strategies**: sum, min, max and running average per bucket
//! - **Meter mode**: cumulative meters are charted by their increments
//! - **Snapshots**: every chart message can be fed back to restore state
//! - **Pluggable storage**: any [`KeyValueStore`] backs the aggregates
//!
//! ## Quick Start
//!
//! ```rust
//! use barchart::{BarChartNode, ChartConfig, Granularity, InboundEvent, MemoryStore, TimeZoneMode};
//!
//! let config = ChartConfig::with_window(Granularity::Hours, 3).with_time_zone(TimeZoneMode::Utc);
//! let mut node = BarChartNode::new(config, MemoryStore::new()).unwrap();
//!
//! // 2024-05-01T10:00:00Z, then a minute later
//! node.handle(&InboundEvent::reading("power", 5.0, 1_714_557_600)).unwrap();
//! let outcome = node.handle(&InboundEvent::reading("power", 7.0, 1_714_557_660)).unwrap();
//!
//! let chart = outcome.message.as_chart().unwrap();
//! assert_eq!(chart.series("power"), Some(&[0.0, 0.0, 12.0][..]));
//! assert_eq!(chart.payload[0].labels, vec!["08", "09", "10"]);
//! ```
//!
//! ## Modules
//!
//! - [`node`]: Event handling entry point
//! - [`command`]: Inbound events and command decoding
//! - [`engine`]: Window eviction and aggregation strategies
//! - [`meter`]: Meter delta processing
//! - [`correction`]: Clear, set meter value, overwrite
//! - [`snapshot`]: Chart messages and restore
//! - [`store`] / [`kv`]: Persisted state over a key-value store
//! - [`timekey`] / [`window`]: Bucket keys, labels and windows

// Modules
pub mod command;
pub mod config;
pub mod correction;
pub mod engine;
pub mod error;
pub mod kv;
pub mod meter;
pub mod node;
pub mod output;
pub mod snapshot;
pub mod store;
pub mod timekey;
pub mod window;

// Re-exports for convenient access
pub use command::{Command, InboundEvent};
pub use config::{ChartConfig, Granularity, Strategy, TimeZoneMode};
pub use engine::AggregationEngine;
pub use error::{ChartError, Result, Warning};
pub use kv::{KeyValueStore, MemoryStore};
pub use meter::{MeterDelta, MeterProcessor};
pub use node::{BarChartNode, Notice, OutboundMessage, Outcome};
pub use output::{ChartOutput, OutputBuilder};
pub use snapshot::{ChartData, ChartMessage, RestoreSnapshot, Settings};
pub use store::AggregationStore;
pub use timekey::BucketKey;
pub use window::Window;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_restore_from_emitted_message() {
        let config = ChartConfig::with_window(Granularity::Days, 3).with_time_zone(TimeZoneMode::Utc);
        let mut node = BarChartNode::new(config.clone(), MemoryStore::new()).unwrap();
        node.handle(&InboundEvent::reading("a", 4.0, 1_714_557_600))
            .unwrap();
        let outcome = node
            .handle(&InboundEvent::reading("b", 6.0, 1_714_557_600))
            .unwrap();

        let mut wire = serde_json::to_value(&outcome.message).unwrap();
        wire["ts"] = serde_json::json!(1_714_557_600);
        let mut restored = BarChartNode::new(config, MemoryStore::new()).unwrap();
        let outcome = restored.handle_json(wire).unwrap();

        let chart = outcome.message.as_chart().unwrap();
        assert_eq!(chart.info.as_deref(), Some("data restored"));
        assert_eq!(chart.topics, vec!["a", "b"]);
        assert_eq!(chart.series("b"), Some(&[0.0, 0.0, 6.0][..]));
    }
}
