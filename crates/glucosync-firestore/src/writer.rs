//! Incremental writer: diff fetched measurements against what is already
//! stored, then append only the new minutes in capped commit groups.
//!
//! Existing documents are never updated or deleted. A failed commit aborts the
//! write; groups committed before it stay committed, and the next run picks
//! up the rest because the vendor feeds overlap.

use std::collections::HashSet;

use glucosync_core::{minute_bucket, Measurement, MAX_BATCH_SIZE, MINUTE_MS};
use serde_json::Value;

use crate::client::FirestoreClient;
use crate::error::FirestoreError;
use crate::value::document_integer;

const TIMESTAMP_FIELD: &str = "timestamp";

/// Outcome of one [`write_new_measurements`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub written: usize,
    pub skipped: usize,
    pub batches: usize,
}

/// Minute buckets already occupied by stored documents. Documents without a
/// readable `timestamp` are ignored.
#[must_use]
pub fn existing_buckets(documents: &[Value]) -> HashSet<i64> {
    documents
        .iter()
        .filter_map(|doc| document_integer(doc, TIMESTAMP_FIELD))
        .map(minute_bucket)
        .collect()
}

/// Measurements whose minute bucket is not in `existing`, in input order.
/// A bucket is only staged once even if the input repeats it.
#[must_use]
pub fn plan_new_records<'a>(
    existing: &HashSet<i64>,
    measurements: &'a [Measurement],
) -> Vec<&'a Measurement> {
    let mut staged_buckets = HashSet::new();
    measurements
        .iter()
        .filter(|m| !existing.contains(&m.bucket()) && staged_buckets.insert(m.bucket()))
        .collect()
}

/// Appends the measurements not yet present in `collection`.
///
/// Queries the stored documents in the whole minutes spanned by
/// `measurements`, skips every measurement whose minute is taken, and commits
/// the rest in groups of `batch_size`.
///
/// # Errors
///
/// - [`FirestoreError::InvalidBatchSize`] unless `1 <= batch_size <= 500`.
/// - Any error from [`FirestoreClient::query_range`] or
///   [`FirestoreClient::commit`]; the first failure is returned as-is.
pub async fn write_new_measurements(
    client: &FirestoreClient,
    collection: &str,
    measurements: &[Measurement],
    batch_size: usize,
) -> Result<WriteSummary, FirestoreError> {
    if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
        return Err(FirestoreError::InvalidBatchSize(batch_size));
    }
    let (Some(min_ts), Some(max_ts)) = (
        measurements.iter().map(|m| m.timestamp_ms).min(),
        measurements.iter().map(|m| m.timestamp_ms).max(),
    ) else {
        return Ok(WriteSummary::default());
    };

    // Whole minutes: a stored reading a few seconds before `min_ts` still
    // occupies the first bucket.
    let (from_ts, to_ts) = bucket_span(min_ts, max_ts);
    let documents = client
        .query_range(collection, TIMESTAMP_FIELD, from_ts, to_ts)
        .await?;
    let existing = existing_buckets(&documents);
    tracing::debug!(
        collection,
        from_ts,
        to_ts,
        existing = existing.len(),
        "loaded stored minutes in range"
    );

    let staged = plan_new_records(&existing, measurements);
    let mut summary = WriteSummary {
        skipped: measurements.len() - staged.len(),
        ..WriteSummary::default()
    };

    for group in staged.chunks(batch_size) {
        let writes = group
            .iter()
            .map(|m| {
                let record = stored_record(m)?;
                Ok(client.create_write(collection, &record))
            })
            .collect::<Result<Vec<_>, FirestoreError>>()?;
        summary.written += client.commit(writes).await?;
        summary.batches += 1;
        tracing::info!(
            collection,
            batch = summary.batches,
            size = group.len(),
            "committed batch"
        );
    }

    Ok(summary)
}

/// First and last millisecond of the minutes holding `min_ts` and `max_ts`.
fn bucket_span(min_ts: i64, max_ts: i64) -> (i64, i64) {
    (
        minute_bucket(min_ts) * MINUTE_MS,
        minute_bucket(max_ts) * MINUTE_MS + (MINUTE_MS - 1),
    )
}

/// The persisted `{timestamp, value, isHi}` object for `m`.
fn stored_record(m: &Measurement) -> Result<serde_json::Map<String, Value>, FirestoreError> {
    match serde_json::to_value(m) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(FirestoreError::Deserialize {
            context: format!("measurement encoded as {other}"),
            source: serde::de::Error::custom("expected a JSON object"),
        }),
        Err(e) => Err(FirestoreError::Deserialize {
            context: "measurement".to_owned(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const MIN: i64 = 60_000;

    fn doc(ts: i64) -> Value {
        json!({"name": "x", "fields": {"timestamp": {"integerValue": ts.to_string()}}})
    }

    #[test]
    fn existing_buckets_floor_timestamps() {
        let buckets = existing_buckets(&[doc(MIN + 5), doc(3 * MIN + 59_999), json!({"name": "no-fields"})]);
        assert_eq!(buckets, HashSet::from([1, 3]));
    }

    #[test]
    fn plan_skips_occupied_minutes_even_with_other_seconds() {
        let existing = HashSet::from([1]);
        let ms = vec![
            Measurement::new(MIN + 30_000, 100),
            Measurement::new(2 * MIN, 110),
        ];
        let planned = plan_new_records(&existing, &ms);
        assert_eq!(planned, vec![&ms[1]]);
    }

    #[test]
    fn plan_is_idempotent_once_written() {
        let ms: Vec<Measurement> = (0..10).map(|i| Measurement::new(i * 5 * MIN, 100)).collect();
        let mut stored = HashSet::new();

        let first = plan_new_records(&stored, &ms);
        assert_eq!(first.len(), 10);
        stored.extend(first.iter().map(|m| m.bucket()));

        assert!(plan_new_records(&stored, &ms).is_empty());
    }

    #[test]
    fn plan_stages_each_bucket_once() {
        let ms = vec![Measurement::new(MIN, 100), Measurement::new(MIN + 1, 101)];
        assert_eq!(plan_new_records(&HashSet::new(), &ms).len(), 1);
    }

    #[test]
    fn bucket_span_widens_to_whole_minutes() {
        assert_eq!(bucket_span(40_000, 300_000), (0, 5 * MIN + 59_999));
        assert_eq!(bucket_span(-1, -1), (-MIN, -1));
    }

    #[test]
    fn stored_record_has_persisted_shape() {
        let record = stored_record(&Measurement::new(MIN, 640)).unwrap();
        assert_eq!(
            Value::Object(record),
            json!({"timestamp": MIN, "value": 500, "isHi": true})
        );
    }
}
