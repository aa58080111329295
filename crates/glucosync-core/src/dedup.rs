//! Minute-bucket deduplication across the two vendor feeds.

use std::collections::BTreeMap;

use crate::measurement::{FeedSource, Measurement};

/// Collapses `measurements` to one record per minute bucket.
///
/// Insertion order decides collisions: a later record replaces an earlier one
/// in the same bucket. The result is sorted ascending by `timestamp_ms`.
#[must_use]
pub fn dedupe_by_minute<I>(measurements: I) -> Vec<Measurement>
where
    I: IntoIterator<Item = Measurement>,
{
    let mut by_bucket: BTreeMap<i64, Measurement> = BTreeMap::new();
    for m in measurements {
        by_bucket.insert(m.bucket(), m);
    }
    // Buckets are monotone in timestamp, so bucket order is timestamp order.
    by_bucket.into_values().collect()
}

/// Merges the graph and logbook feeds, graph first, so logbook values win
/// any minute the two feeds share.
#[must_use]
pub fn merge_feeds(graph: Vec<Measurement>, logbook: Vec<Measurement>) -> Vec<Measurement> {
    let graph_len = graph.len();
    let logbook_len = logbook.len();

    let tagged_graph = graph.into_iter().map(|m| tag(m, FeedSource::Graph));
    let tagged_logbook = logbook.into_iter().map(|m| tag(m, FeedSource::Logbook));
    let merged = dedupe_by_minute(tagged_graph.chain(tagged_logbook));

    tracing::debug!(
        graph = graph_len,
        logbook = logbook_len,
        unique = merged.len(),
        "merged feeds"
    );
    merged
}

fn tag(m: Measurement, source: FeedSource) -> Measurement {
    if m.source.is_some() {
        m
    } else {
        m.with_source(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: i64 = 60_000;

    fn m(ts: i64, value: i64) -> Measurement {
        Measurement::new(ts, value)
    }

    fn pairs(ms: &[Measurement]) -> Vec<(i64, i64)> {
        ms.iter().map(|m| (m.timestamp_ms, m.value)).collect()
    }

    #[test]
    fn logbook_wins_shared_minute() {
        let graph = vec![m(0, 120), m(15 * MIN, 130)];
        let logbook = vec![m(15 * MIN, 135), m(30 * MIN, 140)];

        let merged = merge_feeds(graph, logbook);

        assert_eq!(
            pairs(&merged),
            vec![(0, 120), (15 * MIN, 135), (30 * MIN, 140)]
        );
        assert_eq!(merged[1].source, Some(FeedSource::Logbook));
        assert_eq!(merged[0].source, Some(FeedSource::Graph));
    }

    #[test]
    fn same_bucket_different_seconds_keeps_later_insertion() {
        let merged = dedupe_by_minute(vec![m(5 * MIN + 10_000, 100), m(5 * MIN + 50_000, 105)]);
        assert_eq!(pairs(&merged), vec![(5 * MIN + 50_000, 105)]);

        let merged = dedupe_by_minute(vec![m(5 * MIN + 50_000, 105), m(5 * MIN + 10_000, 100)]);
        assert_eq!(pairs(&merged), vec![(5 * MIN + 10_000, 100)]);
    }

    #[test]
    fn close_timestamps_in_different_buckets_both_survive() {
        let merged = dedupe_by_minute(vec![m(MIN - 1, 100), m(MIN, 101)]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn output_is_sorted_ascending() {
        let graph = vec![m(40 * MIN, 1), m(10 * MIN, 2), m(25 * MIN, 3)];
        let logbook = vec![m(5 * MIN, 4), m(60 * MIN, 5)];
        let merged = merge_feeds(graph, logbook);
        assert!(merged
            .windows(2)
            .all(|w| w[0].timestamp_ms <= w[1].timestamp_ms));
        assert_eq!(merged.len(), 5);
    }

    #[test]
    fn empty_feeds_produce_empty_output() {
        assert!(merge_feeds(Vec::new(), Vec::new()).is_empty());
    }
}
