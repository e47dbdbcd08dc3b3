// crates/core/src/bucket.rs
//! Hour buckets, the `dates` axis, and timestamp parsing.
//!
//! All instants are timezone-naive. Offset-carrying inputs are converted to
//! UTC before the offset is dropped, so two spellings of the same instant
//! land in the same bucket.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// strftime pattern of an hourly bucket label (`2024-01-01-00`).
pub const HOUR_LABEL_FORMAT: &str = "%Y-%m-%d-%H";

/// Widest range a rollup may cover, in days. Bounds the hour axis allocation.
pub const MAX_RANGE_DAYS: u32 = 3660;

/// Naive layouts accepted for timestamp strings, tried in order.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Truncate to the start of the hour. Sub-hour parts are floored, never rounded.
pub fn floor_to_hour(ts: NaiveDateTime) -> NaiveDateTime {
    ts.date().and_time(NaiveTime::MIN) + Duration::hours(i64::from(ts.hour()))
}

/// Bucket label for the hour containing `ts`.
pub fn hour_label(ts: NaiveDateTime) -> String {
    floor_to_hour(ts).format(HOUR_LABEL_FORMAT).to_string()
}

/// Parse a timestamp string.
///
/// Accepts RFC 3339 (converted to UTC), the naive layouts in
/// [`NAIVE_FORMATS`], bare dates (midnight), and hour labels
/// (`YYYY-MM-DD-HH`).
pub fn parse_timestamp_str(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    if let Some(dt) = parse_hour_label(s) {
        return Some(dt);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

/// Parse a `YYYY-MM-DD-HH` bucket label back to the start of its hour.
pub fn parse_hour_label(s: &str) -> Option<NaiveDateTime> {
    if s.len() != 13 || !s.is_char_boundary(10) || s.as_bytes()[10] != b'-' {
        return None;
    }
    let date = NaiveDate::parse_from_str(&s[..10], "%Y-%m-%d").ok()?;
    let hour: u32 = s[11..].parse().ok()?;
    let time = NaiveTime::from_hms_opt(hour, 0, 0)?;
    Some(date.and_time(time))
}

/// Unix seconds (possibly fractional) to a naive UTC instant.
pub fn from_unix_seconds(secs: f64) -> Option<NaiveDateTime> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999)).map(|d| d.naive_utc())
}

/// Unix milliseconds to a naive UTC instant.
pub fn from_unix_millis(millis: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis).map(|d| d.naive_utc())
}

/// Inclusive `[start, end]` window of a rollup invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// The trailing `days` ending at `now`, or `None` when the start would
    /// fall before the earliest representable instant.
    pub fn last_days(now: NaiveDateTime, days: u32) -> Option<Self> {
        let start = now.checked_sub_signed(Duration::days(i64::from(days)))?;
        Some(Self { start, end: now })
    }

    /// Whether the range spans more than [`MAX_RANGE_DAYS`].
    pub fn exceeds_max_span(&self) -> bool {
        !self.is_empty() && (self.end - self.start).num_days() > i64::from(MAX_RANGE_DAYS)
    }

    /// An inverted range has no buckets. It is not an error.
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start <= ts && ts <= self.end
    }

    /// Number of whole hours between the floored bounds, inclusive.
    pub fn hour_count(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        let span = floor_to_hour(self.end) - floor_to_hour(self.start);
        span.num_hours() as usize + 1
    }

    /// Position of `ts` on the hour axis, or `None` when outside the range.
    pub fn slot_of(&self, ts: NaiveDateTime) -> Option<usize> {
        if !self.contains(ts) {
            return None;
        }
        let offset = floor_to_hour(ts) - floor_to_hour(self.start);
        Some(offset.num_hours() as usize)
    }
}

/// The authoritative `dates` axis: one label per hour from
/// `floor(start)` to `floor(end)` inclusive.
pub fn hour_axis(range: &TimeRange) -> Vec<String> {
    let first = floor_to_hour(range.start);
    (0..range.hour_count())
        .map(|i| hour_label(first + Duration::hours(i as i64)))
        .collect()
}

/// Parse a range bound supplied on the command line or in a query string.
pub fn parse_range_bound(raw: &str) -> Option<NaiveDateTime> {
    parse_timestamp_str(raw)
}
