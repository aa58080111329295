//! One sync pass: fetch both LibreLinkUp feeds, normalize and dedupe them,
//! then append the minutes the store does not have yet.
//!
//! Every step awaits the previous one. Any error ends the run; batches that
//! were already committed stay, and the next run fills the rest.

use std::fmt;

use anyhow::Context;
use glucosync_core::{interval_stats, merge_feeds, AppConfig, FeedSource, Measurement};
use glucosync_firestore::{write_new_measurements, FirestoreClient, ServiceAccount, WriteSummary};
use glucosync_librelink::{display_name, select_patient, LibreLinkClient, Normalizer};

use crate::SyncArgs;

/// How a pass ended. Every variant is a successful exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SyncOutcome {
    /// Both feeds were empty after normalization; the store was not touched.
    NoData,
    /// `--dry-run`: this many deduplicated measurements would be diffed.
    DryRun { candidates: usize },
    Written(WriteSummary),
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoData => write!(f, "no new data"),
            Self::DryRun { candidates } => {
                write!(f, "dry-run: nothing written ({candidates} candidates)")
            }
            Self::Written(summary) => write!(
                f,
                "result: {} added / {} skipped (existing)",
                summary.written, summary.skipped
            ),
        }
    }
}

pub(crate) async fn run_sync(config: &AppConfig, args: SyncArgs) -> anyhow::Result<SyncOutcome> {
    println!("run started at {}", chrono::Utc::now().to_rfc3339());

    let store = build_store_client(config)?;
    println!("firestore ready (project {})", store.project_id());

    let mut librelink = LibreLinkClient::new(
        &config.librelink_api_url,
        &config.librelink_client_version,
        config.librelink_request_timeout_secs,
        config.librelink_max_retries,
    )
    .context("failed to build LibreLinkUp client")?;

    librelink
        .login(&config.librelink_email, &config.librelink_password)
        .await?;
    let connections = librelink.connections().await?;
    let patient = select_patient(
        &connections,
        config.librelink_patient_id.as_deref(),
        config.librelink_patient_index,
    )?;
    let name = patient.record.map(display_name).unwrap_or_default();
    if name.is_empty() {
        println!("patient: {}", patient.patient_id);
    } else {
        println!("patient: {name}");
    }

    let normalizer = Normalizer::new(config.assume_tz);
    let graph_raw = librelink.graph(&patient.patient_id).await?;
    let logbook_raw = librelink.logbook(&patient.patient_id).await?;
    let graph = normalizer.normalize_feed(&graph_raw, FeedSource::Graph);
    let logbook = normalizer.normalize_feed(&logbook_raw, FeedSource::Logbook);
    tracing::info!(
        graph_raw = graph_raw.len(),
        graph = graph.len(),
        logbook_raw = logbook_raw.len(),
        logbook = logbook.len(),
        "normalized feeds"
    );

    let measurements = merge_feeds(graph, logbook);
    println!("fetched {} measurements", measurements.len());

    if args.debug_intervals || config.debug_intervals {
        let stats = interval_stats(&measurements);
        tracing::info!(
            gap_count = stats.gap_count,
            max_gap_minutes = ?stats.max_gap_minutes,
            "interval statistics"
        );
        println!("intervals: {stats}");
    }

    if measurements.is_empty() {
        return Ok(SyncOutcome::NoData);
    }

    if args.dry_run {
        println!(
            "dry-run: would diff {} measurements ({}) against '{}'",
            measurements.len(),
            describe_range(&measurements),
            config.firestore_collection
        );
        return Ok(SyncOutcome::DryRun {
            candidates: measurements.len(),
        });
    }

    let summary = write_new_measurements(
        &store,
        &config.firestore_collection,
        &measurements,
        config.firestore_batch_size,
    )
    .await?;
    tracing::info!(
        written = summary.written,
        skipped = summary.skipped,
        batches = summary.batches,
        "sync finished"
    );
    Ok(SyncOutcome::Written(summary))
}

/// Emulator when `FIRESTORE_EMULATOR_HOST` is set, otherwise the real API
/// with the service account.
fn build_store_client(config: &AppConfig) -> anyhow::Result<FirestoreClient> {
    let account = ServiceAccount::from_json(&config.firebase_service_account)?;
    let client = match config.firestore_emulator_host.as_deref() {
        Some(host) => {
            tracing::info!(host, project_id = %account.project_id, "using Firestore emulator");
            FirestoreClient::emulator(
                host,
                &account.project_id,
                config.librelink_request_timeout_secs,
            )?
        }
        None => FirestoreClient::new(account, config.librelink_request_timeout_secs)?,
    };
    Ok(client)
}

/// `first .. last` as RFC 3339 UTC; input is sorted ascending.
fn describe_range(measurements: &[Measurement]) -> String {
    let fmt = |ts: i64| {
        chrono::DateTime::from_timestamp_millis(ts)
            .map_or_else(|| ts.to_string(), |dt| dt.to_rfc3339())
    };
    match (measurements.first(), measurements.last()) {
        (Some(first), Some(last)) => {
            format!("{} .. {}", fmt(first.timestamp_ms), fmt(last.timestamp_ms))
        }
        _ => "empty".to_owned(),
    }
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod tests;
