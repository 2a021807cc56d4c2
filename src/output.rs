//! Output builder
//!
//! Turns the stored buckets into chart-ready arrays: one series per
//! registered topic, one value per window key, missing buckets as `0`.

use crate::kv::KeyValueStore;
use crate::store::AggregationStore;
use crate::window::Window;

/// Round `value` to `decimals` decimal places.
///
/// Values too large to scale are returned unchanged; they carry no
/// fractional digits anyway.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / factor
}

/// Series data aligned to a window, plus summary statistics
#[derive(Debug, Clone, PartialEq)]
pub struct ChartOutput {
    /// Topic names, registry order
    pub series: Vec<String>,
    /// `data[i][j]` = value of `series[i]` at window key `j`
    pub data: Vec<Vec<f64>>,
    /// Smallest value across all series (0 without series)
    pub min: f64,
    /// Largest value across all series (0 without series)
    pub max: f64,
    /// Rounded sum across all series
    pub sum: f64,
}

/// Assembles [`ChartOutput`] with a fixed rounding precision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputBuilder {
    precision: u32,
}

impl OutputBuilder {
    /// `precision` of 0 disables rounding
    pub fn new(precision: u32) -> Self {
        Self { precision }
    }

    pub fn round(&self, value: f64) -> f64 {
        if self.precision == 0 {
            value
        } else {
            round_to(value, self.precision)
        }
    }

    pub fn build<S: KeyValueStore>(
        &self,
        store: &AggregationStore<S>,
        window: &Window,
    ) -> ChartOutput {
        let series = store.topics();
        let data: Vec<Vec<f64>> = series
            .iter()
            .map(|topic| {
                let buckets = store.buckets(topic).unwrap_or_default();
                window
                    .keys()
                    .iter()
                    .map(|key| buckets.get(key).map_or(0.0, |v| self.round(*v)))
                    .collect()
            })
            .collect();

        let all = || data.iter().flatten().copied();
        let (min, max) = if data.is_empty() {
            (0.0, 0.0)
        } else {
            (
                all().fold(f64::INFINITY, f64::min),
                all().fold(f64::NEG_INFINITY, f64::max),
            )
        };
        let sum = self.round(all().sum());

        ChartOutput {
            series,
            data,
            min,
            max,
            sum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Granularity;
    use crate::kv::MemoryStore;
    use crate::store::BucketMap;
    use chrono::NaiveDate;

    fn window() -> Window {
        let at = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(2, 0, 0)
            .unwrap();
        Window::build(at, 3, Granularity::Hours).unwrap()
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(1.235, 0), 1.0);
        assert_eq!(round_to(-2.5, 0), -3.0);
    }

    #[test]
    fn test_round_to_huge_values() {
        assert_eq!(round_to(1e301, 8), 1e301);
        assert_eq!(round_to(f64::MAX, 2), f64::MAX);
        assert!(round_to(f64::INFINITY, 2).is_infinite());
    }

    #[test]
    fn test_precision_zero_disables_rounding() {
        assert_eq!(OutputBuilder::new(0).round(1.23456), 1.23456);
        assert_eq!(OutputBuilder::new(1).round(1.26), 1.3);
    }

    #[test]
    fn test_build_aligns_and_fills_gaps() {
        let mut store = AggregationStore::new(MemoryStore::new());
        store.add_topic("a");
        store.add_topic("b");
        store.set_buckets("a", &BucketMap::from([("2024050102".to_string(), 12.0)]));
        store.set_buckets(
            "b",
            &BucketMap::from([
                ("2024050100".to_string(), 1.004),
                ("2024050101".to_string(), -3.0),
            ]),
        );

        let output = OutputBuilder::new(2).build(&store, &window());
        assert_eq!(output.series, vec!["a", "b"]);
        assert_eq!(output.data, vec![vec![0.0, 0.0, 12.0], vec![1.0, -3.0, 0.0]]);
        assert_eq!(output.min, -3.0);
        assert_eq!(output.max, 12.0);
        assert_eq!(output.sum, 10.0);
    }

    #[test]
    fn test_build_without_topics() {
        let store = AggregationStore::new(MemoryStore::new());
        let output = OutputBuilder::new(2).build(&store, &window());
        assert!(output.series.is_empty());
        assert_eq!((output.min, output.max, output.sum), (0.0, 0.0, 0.0));
    }
}
