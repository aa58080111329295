//! Key-value view over a raw vendor record.
//!
//! LibreLinkUp has shipped the same fields as `patientId`, `patient_id` and
//! `PatientId` depending on API and app version. Every lookup here compares
//! keys with case and `_`/`-` separators ignored, and takes an ordered list of
//! candidate names so each field's drift is handled in one place.

use serde_json::{Map, Value};

/// Borrowed view over one JSON object from a vendor feed.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    fields: &'a Map<String, Value>,
}

impl<'a> RecordView<'a> {
    /// Wraps `value` if it is a JSON object.
    #[must_use]
    pub fn new(value: &'a Value) -> Option<Self> {
        value.as_object().map(|fields| Self { fields })
    }

    /// Looks up a single field. An exact key match wins over a fuzzy one.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        if let Some(v) = self.fields.get(key) {
            return Some(v);
        }
        let wanted = fold_key(key);
        self.fields
            .iter()
            .find(|(k, _)| fold_key(k) == wanted)
            .map(|(_, v)| v)
    }

    /// Returns the first non-null field among `keys`, in priority order.
    #[must_use]
    pub fn first(&self, keys: &[&str]) -> Option<&'a Value> {
        keys.iter()
            .filter_map(|k| self.get(k))
            .find(|v| !v.is_null())
    }

    /// Like [`RecordView::first`], restricted to non-empty string values.
    #[must_use]
    pub fn first_str(&self, keys: &[&str]) -> Option<&'a str> {
        keys.iter()
            .filter_map(|k| self.get(k))
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|s| !s.is_empty())
    }
}

fn fold_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Pulls the record array out of a response `data` payload.
///
/// Accepts either a bare array or an object holding the array under the
/// first matching key in `keys`. Anything else yields an empty feed.
#[must_use]
pub fn records_in(data: &Value, keys: &[&str]) -> Vec<Value> {
    if let Some(items) = data.as_array() {
        return items.clone();
    }
    RecordView::new(data)
        .and_then(|view| view.first(keys))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}
