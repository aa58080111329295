//! Canonical glucose measurement shared by the fetcher, the deduplicator and
//! the store writer.
//!
//! A [`Measurement`] serializes to the persisted document shape
//! `{"timestamp": <ms>, "value": <0..=500>, "isHi": <bool>}`. The feed tag is
//! in-memory only and never reaches the store.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reading reported for the vendor's "HI" sentinel, and the clamp ceiling for
/// every numeric reading.
pub const HI_VALUE: i64 = 500;

/// Width of a deduplication bucket in milliseconds.
pub const MINUTE_MS: i64 = 60_000;

/// Which vendor feed a measurement came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSource {
    /// Recent, high-resolution window.
    Graph,
    /// Longer, coarser history.
    Logbook,
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedSource::Graph => write!(f, "graph"),
            FeedSource::Logbook => write!(f, "logbook"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    /// Epoch milliseconds, always UTC.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    pub value: i64,
    #[serde(rename = "isHi")]
    pub is_hi: bool,
    #[serde(skip)]
    pub source: Option<FeedSource>,
}

impl Measurement {
    /// Builds a measurement from a numeric reading, clamping anything at or
    /// above [`HI_VALUE`] to exactly `HI_VALUE` with `is_hi` set.
    #[must_use]
    pub fn new(timestamp_ms: i64, value: i64) -> Self {
        let is_hi = value >= HI_VALUE;
        Self {
            timestamp_ms,
            value: value.min(HI_VALUE),
            is_hi,
            source: None,
        }
    }

    /// Builds the measurement for a "HI" sentinel reading.
    #[must_use]
    pub fn hi(timestamp_ms: i64) -> Self {
        Self::new(timestamp_ms, HI_VALUE)
    }

    #[must_use]
    pub fn with_source(mut self, source: FeedSource) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn bucket(&self) -> i64 {
        minute_bucket(self.timestamp_ms)
    }
}

/// Floor-divides an epoch-millisecond timestamp into its one-minute bucket.
#[must_use]
pub fn minute_bucket(timestamp_ms: i64) -> i64 {
    timestamp_ms.div_euclid(MINUTE_MS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_at_or_above_ceiling_are_clamped_and_flagged() {
        for raw in [500, 501, 650, i64::MAX] {
            let m = Measurement::new(0, raw);
            assert_eq!(m.value, HI_VALUE, "raw {raw}");
            assert!(m.is_hi, "raw {raw}");
        }
    }

    #[test]
    fn values_below_ceiling_pass_through() {
        let m = Measurement::new(0, 499);
        assert_eq!(m.value, 499);
        assert!(!m.is_hi);
    }

    #[test]
    fn hi_sentinel_is_500() {
        let m = Measurement::hi(1_000);
        assert_eq!((m.value, m.is_hi), (500, true));
    }

    #[test]
    fn minute_bucket_floors() {
        assert_eq!(minute_bucket(0), 0);
        assert_eq!(minute_bucket(59_999), 0);
        assert_eq!(minute_bucket(60_000), 1);
        assert_eq!(minute_bucket(-1), -1);
    }

    #[test]
    fn serializes_to_stored_record_shape() {
        let m = Measurement::new(1_700_000_000_000, 120).with_source(FeedSource::Graph);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"timestamp": 1_700_000_000_000_i64, "value": 120, "isHi": false})
        );
    }
}
