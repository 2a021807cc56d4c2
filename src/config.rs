//! Node configuration
//!
//! A [`ChartConfig`] is fixed for the lifetime of a node instance. It is
//! deserialized from the same option names a dashboard flow uses
//! (`x_interval`, `x_size`, `agg_by`, ...), and every field has a default.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ChartError, Result};

/// Largest accepted `precision`; f64 carries no more significant decimals.
pub const MAX_PRECISION: u32 = 15;

/// Bucket width of the chart's x axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Seconds,
    Minutes,
    QuarterHours,
    Hours,
    Days,
    Months,
    Years,
}

impl Granularity {
    /// Wire name, as used by `x_interval`
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Seconds => "seconds",
            Granularity::Minutes => "minutes",
            Granularity::QuarterHours => "quarter_hours",
            Granularity::Hours => "hours",
            Granularity::Days => "days",
            Granularity::Months => "months",
            Granularity::Years => "years",
        }
    }

    pub fn all() -> [Granularity; 7] {
        [
            Granularity::Seconds,
            Granularity::Minutes,
            Granularity::QuarterHours,
            Granularity::Hours,
            Granularity::Days,
            Granularity::Months,
            Granularity::Years,
        ]
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self> {
        Granularity::all()
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| ChartError::UnknownGranularity(s.to_string()))
    }
}

/// How a new reading is folded into the current bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Sum,
    Min,
    Max,
    Avg,
}

impl Strategy {
    /// Wire name, as used by `agg_by`
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Sum => "sum",
            Strategy::Min => "min",
            Strategy::Max => "max",
            Strategy::Avg => "avg",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sum" => Ok(Strategy::Sum),
            "min" => Ok(Strategy::Min),
            "max" => Ok(Strategy::Max),
            "avg" => Ok(Strategy::Avg),
            other => Err(ChartError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Time zone whose wall clock defines bucket boundaries and labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeZoneMode {
    /// Host's local time zone
    #[default]
    Local,
    Utc,
    /// Fixed offset east of UTC, in minutes
    Fixed(i32),
}

/// Node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    /// Display unit, passed through to `settings`
    pub unit: String,

    /// Bucket granularity (default: hours)
    pub x_interval: Granularity,

    /// Number of buckets in the window (default: 24)
    pub x_size: usize,

    /// Decimal places for output rounding (default: 2, 0 disables rounding)
    pub precision: u32,

    /// Treat readings as cumulative meter values
    #[serde(deserialize_with = "flexible_bool")]
    pub is_meter_reading: bool,

    /// Aggregation strategy (default: sum)
    pub agg_by: Strategy,

    /// Clamp negative meter deltas to zero
    #[serde(deserialize_with = "flexible_bool")]
    pub prevent_negative: bool,

    /// Time zone for bucket boundaries (default: local)
    pub time_zone: TimeZoneMode,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            unit: String::new(),
            x_interval: Granularity::Hours,
            x_size: 24,
            precision: 2,
            is_meter_reading: false,
            agg_by: Strategy::Sum,
            prevent_negative: false,
            time_zone: TimeZoneMode::Local,
        }
    }
}

impl ChartConfig {
    /// Create a configuration with a custom granularity and window size
    pub fn with_window(x_interval: Granularity, x_size: usize) -> Self {
        Self {
            x_interval,
            x_size,
            ..Default::default()
        }
    }

    /// Configuration for cumulative meter readings
    pub fn meter(x_interval: Granularity, x_size: usize, prevent_negative: bool) -> Self {
        Self {
            x_interval,
            x_size,
            is_meter_reading: true,
            prevent_negative,
            ..Default::default()
        }
    }

    pub fn with_strategy(mut self, agg_by: Strategy) -> Self {
        self.agg_by = agg_by;
        self
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_time_zone(mut self, time_zone: TimeZoneMode) -> Self {
        self.time_zone = time_zone;
        self
    }

    /// Check the options that cannot be expressed by the types alone
    pub fn validate(&self) -> Result<()> {
        if self.x_size == 0 {
            return Err(ChartError::InvalidConfig(
                "x_size must be at least 1".to_string(),
            ));
        }
        if self.precision > MAX_PRECISION {
            return Err(ChartError::InvalidConfig(format!(
                "precision {} exceeds maximum {}",
                self.precision, MAX_PRECISION
            )));
        }
        if let TimeZoneMode::Fixed(minutes) = self.time_zone {
            if minutes.abs() >= 24 * 60 {
                return Err(ChartError::InvalidConfig(format!(
                    "fixed offset of {} minutes is out of range",
                    minutes
                )));
            }
        }
        Ok(())
    }
}

/// Accepts `true`/`false` as well as the strings flow editors store ("True").
fn flexible_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Text(s) => s.trim().eq_ignore_ascii_case("true"),
    })
}
