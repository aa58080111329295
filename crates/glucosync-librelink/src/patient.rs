//! Patient (connection) selection from the LibreLinkUp connections list.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::LibreLinkError;
use crate::record::RecordView;

/// Identifier fields, highest priority first.
const PATIENT_ID_KEYS: &[&str] = &["patientId", "patient_id", "id"];

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b")
        .expect("valid uuid regex")
});

/// The connection chosen for this run.
#[derive(Debug, Clone)]
pub struct SelectedPatient<'a> {
    pub patient_id: String,
    /// The matching connection record. `None` when an explicit id was
    /// configured that the connections list does not contain.
    pub record: Option<&'a Value>,
}

/// Recovers a stable patient id from a connection record.
///
/// Tries the known id fields first, then falls back to the first UUID that
/// appears anywhere in the record's JSON text.
#[must_use]
pub fn extract_patient_id(record: &Value) -> Option<String> {
    if let Some(id) = RecordView::new(record).and_then(|view| view.first_str(PATIENT_ID_KEYS)) {
        return Some(id.to_owned());
    }
    let text = serde_json::to_string(record).ok()?;
    UUID_RE.find(&text).map(|m| m.as_str().to_owned())
}

/// `"First Last"` for status output; empty when the record has no names.
#[must_use]
pub fn display_name(record: &Value) -> String {
    let Some(view) = RecordView::new(record) else {
        return String::new();
    };
    [view.first_str(&["firstName"]), view.first_str(&["lastName"])]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Picks one connection.
///
/// An explicit `patient_id` wins. It is matched against each record's
/// extracted id; when nothing matches the configured id is still used and a
/// warning is logged. Without one, `index` selects by position, clamped into
/// range.
///
/// # Errors
///
/// - [`LibreLinkError::NoPatients`] if `connections` is empty.
/// - [`LibreLinkError::PatientIdUnresolved`] if the record picked by index
///   carries no recognisable id.
pub fn select_patient<'a>(
    connections: &'a [Value],
    patient_id: Option<&str>,
    index: i64,
) -> Result<SelectedPatient<'a>, LibreLinkError> {
    if connections.is_empty() {
        return Err(LibreLinkError::NoPatients);
    }

    if let Some(wanted) = patient_id {
        let record = connections
            .iter()
            .find(|c| extract_patient_id(c).as_deref() == Some(wanted));
        if record.is_none() {
            tracing::warn!(
                patient_id = wanted,
                connections = connections.len(),
                "configured patient id not in connections list; using it as-is"
            );
        }
        return Ok(SelectedPatient {
            patient_id: wanted.to_owned(),
            record,
        });
    }

    let last = connections.len() - 1;
    let position = usize::try_from(index.max(0)).map_or(last, |i| i.min(last));
    let record = &connections[position];
    let patient_id = extract_patient_id(record).ok_or(LibreLinkError::PatientIdUnresolved)?;
    tracing::debug!(position, %patient_id, "selected patient by index");

    Ok(SelectedPatient {
        patient_id,
        record: Some(record),
    })
}
