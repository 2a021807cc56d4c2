//! Error and warning types for barchart
//!
//! Every failure in this crate is scoped to a single inbound event. Validation
//! happens before any store write, so an `Err` always leaves prior state intact.

use std::fmt;

use thiserror::Error;

/// Result type alias for barchart operations
pub type Result<T> = std::result::Result<T, ChartError>;

/// Main error type for barchart operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChartError {
    /// Control operation needs a topic but the event has none
    #[error("topic is missing, cannot {action}")]
    MissingTopic { action: &'static str },

    /// `set_meter_value` without a usable number
    #[error("new meter value is missing, use for example \"set_meter_value 123.45\"")]
    InvalidMeterValue,

    /// Reading payload is not a finite number
    #[error("invalid reading for topic '{topic}': {payload}")]
    InvalidReading { topic: String, payload: String },

    /// `overwrite_value` without a usable `new_value`
    #[error("new value is missing or not a number, set new_value properly")]
    InvalidNewValue,

    /// `overwrite_value` without a usable integer `index`
    #[error("index is missing or not an integer, set index properly")]
    InvalidIndex,

    /// `overwrite_value` index outside the stored buckets
    #[error("index {index} is outside the data array (length {len})")]
    IndexOutOfRange { index: i64, len: usize },

    /// `overwrite_value` for a topic without bucket data
    #[error("no data found for topic '{topic}'")]
    NoData { topic: String },

    /// Event is not a JSON object of the expected shape
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// Combining the reading would leave a non-finite bucket value
    #[error("value for topic '{topic}' overflows bucket {key}")]
    ValueOverflow { topic: String, key: String },

    /// Timestamp cannot be interpreted or is outside the calendar range
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Restore event with an unusable snapshot
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// Configuration rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unknown `x_interval`
    #[error("unknown granularity: {0}")]
    UnknownGranularity(String),

    /// Unknown `agg_by`
    #[error("unknown aggregation strategy: {0}")]
    UnknownStrategy(String),
}

/// Non-fatal conditions reported next to a successful outcome
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// Meter reading went backwards and the delta was clamped to zero
    NegativeDeltaClamped {
        topic: String,
        last: f64,
        reading: f64,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::NegativeDeltaClamped {
                topic,
                last,
                reading,
            } => write!(
                f,
                "new meter value {} is lower than last one {} for '{}', prevented reading getting negative",
                reading, last, topic
            ),
        }
    }
}
