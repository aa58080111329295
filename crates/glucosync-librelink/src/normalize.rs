//! Normalization of raw LibreLinkUp feed records into [`Measurement`]s.
//!
//! Records that carry no usable timestamp or reading are dropped, never
//! reported as errors.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use glucosync_core::{FeedSource, Measurement};
use serde_json::Value;

use crate::record::RecordView;

/// Timestamp fields, highest priority first.
const TIMESTAMP_KEYS: &[&str] = &["timestamp", "time", "date"];

/// Reading fields, highest priority first. `ValueInMgPerDl` is always mg/dL;
/// plain `Value` follows the account's display unit.
const VALUE_KEYS: &[&str] = &["ValueInMgPerDl", "value", "glucose"];

/// Epoch numbers above this are already milliseconds.
const MS_THRESHOLD: i64 = 1_000_000_000_000;

/// Layouts with a UTC offset. `%z` accepts both `+09:00` and `+0900`.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M%z",
];

/// Offset-free layouts, tried in order. The last is the US-style local time
/// LibreLinkUp uses for `Timestamp` and `FactoryTimestamp`.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
];

/// A bare date means local midnight.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Converts raw feed records into canonical measurements.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    assume_tz: Tz,
}

impl Normalizer {
    /// `assume_tz` is applied to timestamps that carry no offset.
    #[must_use]
    pub fn new(assume_tz: Tz) -> Self {
        Self { assume_tz }
    }

    /// Normalizes every record in a feed, tagging each with `source`.
    #[must_use]
    pub fn normalize_feed(&self, records: &[Value], source: FeedSource) -> Vec<Measurement> {
        let normalized: Vec<Measurement> = records
            .iter()
            .filter_map(|raw| self.normalize(raw))
            .map(|m| m.with_source(source))
            .collect();
        let dropped = records.len() - normalized.len();
        if dropped > 0 {
            tracing::debug!(%source, dropped, "dropped records without timestamp or reading");
        }
        normalized
    }

    /// Normalizes one record, or `None` if it lacks a usable timestamp or
    /// reading.
    #[must_use]
    pub fn normalize(&self, raw: &Value) -> Option<Measurement> {
        let view = RecordView::new(raw)?;
        let timestamp_ms = self.timestamp_ms(view.first(TIMESTAMP_KEYS)?)?;
        match parse_reading(view.first(VALUE_KEYS)?)? {
            Reading::Hi => Some(Measurement::hi(timestamp_ms)),
            Reading::Value(v) => Some(Measurement::new(timestamp_ms, v)),
        }
    }

    /// Converts a timestamp field of any supported shape to UTC epoch ms.
    #[must_use]
    pub fn timestamp_ms(&self, value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    epoch_int_to_ms(i)
                } else {
                    n.as_f64().and_then(epoch_float_to_ms)
                }
            }
            Value::String(s) => self.parse_timestamp_str(s.trim()),
            _ => None,
        }
    }

    fn parse_timestamp_str(&self, s: &str) -> Option<i64> {
        if s.is_empty() {
            return None;
        }
        let iso = s.strip_suffix('Z').map_or_else(|| s.to_owned(), |rest| format!("{rest}+00:00"));
        if let Ok(dt) = DateTime::parse_from_rfc3339(&iso) {
            return Some(dt.timestamp_millis());
        }
        if let Some(dt) = OFFSET_FORMATS
            .iter()
            .find_map(|fmt| DateTime::parse_from_str(&iso, fmt).ok())
        {
            return Some(dt.timestamp_millis());
        }
        if let Some(naive) = NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        {
            return self.localize(naive);
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
            return self.localize(date.and_time(NaiveTime::MIN));
        }
        if let Ok(i) = s.parse::<i64>() {
            return epoch_int_to_ms(i);
        }
        s.parse::<f64>().ok().and_then(epoch_float_to_ms)
    }

    /// Interprets a naive wall-clock time in the assumed zone. Ambiguous
    /// fall-back times resolve to the earlier instant; times inside a
    /// spring-forward gap do not exist and yield `None`.
    fn localize(&self, naive: NaiveDateTime) -> Option<i64> {
        self.assume_tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reading {
    Hi,
    Value(i64),
}

fn parse_reading(value: &Value) -> Option<Reading> {
    let number = match value {
        Value::String(s) => {
            let s = s.trim();
            if s.eq_ignore_ascii_case("HI") {
                return Some(Reading::Hi);
            }
            s.parse::<f64>().ok()?
        }
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    if !number.is_finite() || number < 0.0 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    let rounded = number.round().min(i64::MAX as f64) as i64;
    Some(Reading::Value(rounded))
}

fn epoch_int_to_ms(n: i64) -> Option<i64> {
    if n > MS_THRESHOLD {
        Some(n)
    } else {
        n.checked_mul(1000)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn epoch_float_to_ms(n: f64) -> Option<i64> {
    if !n.is_finite() {
        return None;
    }
    let ms = if n > MS_THRESHOLD as f64 { n } else { n * 1000.0 };
    (ms.abs() < i64::MAX as f64).then(|| ms.round() as i64)
}
