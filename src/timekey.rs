//! Bucket keys, labels and calendar stepping
//!
//! Pure functions, no state. A timestamp is first converted to the wall-clock
//! time of the configured zone; all bucket arithmetic happens on that naive
//! wall-clock value.
//!
//! Keys are built from zero-padded `YYYYMMDDHHMMSS` components truncated from
//! the right, so keys of one granularity sort lexicographically in time order.
//! Quarter hours append `_<1..4>` to the hour key.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Local, Months, NaiveDateTime, TimeZone, Timelike,
    Utc,
};

use crate::config::{Granularity, TimeZoneMode};
use crate::error::{ChartError, Result};

/// Canonical key of one bucket
pub type BucketKey = String;

/// Raw timestamps at or below this value are taken as seconds.
///
/// Breaks for millisecond timestamps before 1970-04-26 and for second
/// timestamps after 2286-11-20; kept for compatibility with existing flows.
pub const SECONDS_THRESHOLD: i64 = 9_999_999_999;

/// Convert a seconds-or-milliseconds timestamp to milliseconds
pub fn normalize_timestamp(raw: i64) -> i64 {
    if raw <= SECONDS_THRESHOLD {
        raw.saturating_mul(1000)
    } else {
        raw
    }
}

/// Current wall-clock time in epoch milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Wall-clock time of `timestamp_ms` in the given zone
pub fn wall_clock(timestamp_ms: i64, zone: TimeZoneMode) -> Result<NaiveDateTime> {
    let out_of_range = || ChartError::InvalidTimestamp(format!("{} is out of range", timestamp_ms));
    match zone {
        TimeZoneMode::Utc => DateTime::from_timestamp_millis(timestamp_ms)
            .map(|dt| dt.naive_utc())
            .ok_or_else(out_of_range),
        TimeZoneMode::Local => Local
            .timestamp_millis_opt(timestamp_ms)
            .single()
            .map(|dt| dt.naive_local())
            .ok_or_else(out_of_range),
        TimeZoneMode::Fixed(minutes) => {
            let offset = FixedOffset::east_opt(minutes * 60).ok_or_else(|| {
                ChartError::InvalidConfig(format!("invalid fixed offset {} minutes", minutes))
            })?;
            offset
                .timestamp_millis_opt(timestamp_ms)
                .single()
                .map(|dt| dt.naive_local())
                .ok_or_else(out_of_range)
        }
    }
}

/// 1-based quarter of the hour
pub fn quarter_index(dt: &NaiveDateTime) -> u32 {
    dt.minute() / 15 + 1
}

/// Key of the bucket containing `dt`
pub fn bucket_key(dt: &NaiveDateTime, granularity: Granularity) -> BucketKey {
    let (y, mo, d) = (dt.year(), dt.month(), dt.day());
    let (h, mi, s) = (dt.hour(), dt.minute(), dt.second());
    match granularity {
        Granularity::Seconds => format!("{:04}{:02}{:02}{:02}{:02}{:02}", y, mo, d, h, mi, s),
        Granularity::Minutes => format!("{:04}{:02}{:02}{:02}{:02}", y, mo, d, h, mi),
        Granularity::QuarterHours => {
            format!("{:04}{:02}{:02}{:02}_{}", y, mo, d, h, quarter_index(dt))
        }
        Granularity::Hours => format!("{:04}{:02}{:02}{:02}", y, mo, d, h),
        Granularity::Days => format!("{:04}{:02}{:02}", y, mo, d),
        Granularity::Months => format!("{:04}{:02}", y, mo),
        Granularity::Years => format!("{:04}", y),
    }
}

/// Human-readable axis label for the bucket containing `dt`
///
/// Quarter hours are labelled with the end of the quarter, so 10:50 renders
/// as `11:00`.
pub fn label(dt: &NaiveDateTime, granularity: Granularity) -> String {
    match granularity {
        Granularity::Seconds => dt.format("%H:%M:%S").to_string(),
        Granularity::Minutes => dt.format("%H:%M").to_string(),
        Granularity::QuarterHours => {
            let hour_start = dt
                .date()
                .and_hms_opt(dt.hour(), 0, 0)
                .unwrap_or(*dt);
            let quarter_end = Duration::minutes(i64::from(quarter_index(dt)) * 15);
            hour_start
                .checked_add_signed(quarter_end)
                .unwrap_or(hour_start)
                .format("%H:%M")
                .to_string()
        }
        Granularity::Hours => dt.format("%H").to_string(),
        Granularity::Days => dt.format("%m-%d").to_string(),
        Granularity::Months => format!("{:04}-{:02}", dt.year(), dt.month()),
        Granularity::Years => format!("{:04}", dt.year()),
    }
}

/// `dt` moved back by `n` granularity units
///
/// Months pin the day to the 1st before subtracting so that e.g. Jan 31
/// lands in December. Returns `None` when leaving chrono's calendar range.
pub fn step_back(dt: &NaiveDateTime, granularity: Granularity, n: u32) -> Option<NaiveDateTime> {
    let n64 = i64::from(n);
    match granularity {
        Granularity::Seconds => dt.checked_sub_signed(Duration::seconds(n64)),
        Granularity::Minutes => dt.checked_sub_signed(Duration::minutes(n64)),
        Granularity::QuarterHours => dt.checked_sub_signed(Duration::minutes(15 * n64)),
        Granularity::Hours => dt.checked_sub_signed(Duration::hours(n64)),
        Granularity::Days => dt.checked_sub_signed(Duration::days(n64)),
        Granularity::Months => dt.with_day(1)?.checked_sub_months(Months::new(n)),
        Granularity::Years => dt.checked_sub_months(Months::new(n.checked_mul(12)?)),
    }
}
