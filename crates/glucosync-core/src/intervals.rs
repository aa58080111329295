//! Sampling-gap statistics for a deduplicated feed.
//!
//! Diagnostic only. Nothing here changes what gets written.

use std::collections::HashMap;
use std::fmt;

use crate::measurement::Measurement;

/// How many of the most frequent gaps to report.
const TOP_GAPS: usize = 5;

/// Distribution of minutes between consecutive measurements.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IntervalStats {
    /// Number of gaps observed (`len - 1` for a non-empty input).
    pub gap_count: usize,
    /// `(gap_minutes, occurrences)` ordered by occurrences descending, then
    /// gap ascending.
    pub most_common: Vec<(i64, usize)>,
    pub max_gap_minutes: Option<i64>,
}

impl fmt::Display for IntervalStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.gap_count == 0 {
            return write!(f, "no intervals (fewer than two samples)");
        }
        let common = self
            .most_common
            .iter()
            .map(|(gap, n)| format!("{gap}min x{n}"))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "gaps: {}; most common: {common}", self.gap_count)?;
        if let Some(max) = self.max_gap_minutes {
            write!(f, "; max: {max}min")?;
        }
        Ok(())
    }
}

/// Computes gap statistics over `sorted`, which must already be ascending by
/// timestamp (the output of [`crate::merge_feeds`]).
///
/// Gaps are measured in whole minute buckets.
#[must_use]
pub fn interval_stats(sorted: &[Measurement]) -> IntervalStats {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for pair in sorted.windows(2) {
        let gap = pair[1].bucket() - pair[0].bucket();
        *counts.entry(gap).or_default() += 1;
    }

    let gap_count = counts.values().sum();
    let max_gap_minutes = counts.keys().copied().max();

    let mut most_common: Vec<(i64, usize)> = counts.into_iter().collect();
    most_common.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    most_common.truncate(TOP_GAPS);

    IntervalStats {
        gap_count,
        most_common,
        max_gap_minutes,
    }
}
