//! Google service-account key parsing.

use serde::Deserialize;

use crate::error::FirestoreError;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// The fields of a service-account JSON key that the sync uses.
///
/// `client_email` and `private_key` may be absent when only the emulator is
/// targeted; [`crate::auth::TokenProvider::new`] rejects them if empty.
#[derive(Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    #[serde(default)]
    pub client_email: String,
    #[serde(default)]
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_owned()
}

impl ServiceAccount {
    /// Parses the JSON blob from `FIREBASE_SERVICE_ACCOUNT`.
    ///
    /// # Errors
    ///
    /// Returns [`FirestoreError::Credentials`] if the blob is not valid JSON,
    /// lacks `project_id`, or has an empty `project_id`.
    pub fn from_json(blob: &str) -> Result<Self, FirestoreError> {
        let account: Self = serde_json::from_str(blob)
            .map_err(|e| FirestoreError::Credentials(format!("not a service account key: {e}")))?;
        if account.project_id.trim().is_empty() {
            return Err(FirestoreError::Credentials("project_id is empty".to_owned()));
        }
        Ok(account)
    }
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &"[redacted]")
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}
