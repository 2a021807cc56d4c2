//! Sliding window of bucket keys.
//!
//! A window is never stored: every operation rebuilds it from its own
//! reference time, which is what makes it slide.

use chrono::NaiveDateTime;

use crate::config::Granularity;
use crate::error::{ChartError, Result};
use crate::timekey::{bucket_key, label, step_back, BucketKey};

/// The `size` most recent buckets ending at a reference time, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    keys: Vec<BucketKey>,
    labels: Vec<String>,
}

impl Window {
    /// Build the window ending at the bucket that contains `reference`.
    pub fn build(reference: NaiveDateTime, size: usize, granularity: Granularity) -> Result<Self> {
        let mut keys = Vec::with_capacity(size);
        let mut labels = Vec::with_capacity(size);

        let mut cursor = reference;
        for i in 0..size {
            keys.push(bucket_key(&cursor, granularity));
            labels.push(label(&cursor, granularity));
            if i + 1 < size {
                cursor = step_back(&cursor, granularity, 1).ok_or_else(|| {
                    ChartError::InvalidTimestamp(format!(
                        "window of {} {} before {} leaves the calendar range",
                        size, granularity, reference
                    ))
                })?;
            }
        }

        keys.reverse();
        labels.reverse();
        Ok(Self { keys, labels })
    }

    pub fn keys(&self) -> &[BucketKey] {
        &self.keys
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Key of the newest bucket, the one containing the reference time.
    pub fn current_key(&self) -> Option<&BucketKey> {
        self.keys.last()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
