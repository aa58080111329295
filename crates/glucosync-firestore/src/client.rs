//! Minimal Firestore REST client: one range query and batched commits.

use std::time::Duration;

use rand::distr::Alphanumeric;
use rand::Rng;
use reqwest::Client;
use serde_json::{json, Value};

use crate::auth::TokenProvider;
use crate::credentials::ServiceAccount;
use crate::error::FirestoreError;
use crate::value::{encode_fields, encode_value};

const DEFAULT_API_ROOT: &str = "https://firestore.googleapis.com/v1";

/// Length of generated document ids, matching the client SDKs' auto-ids.
const AUTO_ID_LEN: usize = 20;

enum Auth {
    ServiceAccount(TokenProvider),
    /// The emulator accepts any bearer token; `owner` bypasses security rules.
    Emulator,
}

/// Firestore client bound to one project's `(default)` database.
pub struct FirestoreClient {
    client: Client,
    api_root: String,
    project_id: String,
    auth: Auth,
}

impl FirestoreClient {
    /// Creates a client that authenticates as `account`.
    ///
    /// # Errors
    ///
    /// - [`FirestoreError::Http`] if the `reqwest::Client` cannot be built.
    /// - [`FirestoreError::Credentials`] / [`FirestoreError::Signing`] if the
    ///   account's key material is unusable.
    pub fn new(account: ServiceAccount, timeout_secs: u64) -> Result<Self, FirestoreError> {
        let client = build_http_client(timeout_secs)?;
        let project_id = account.project_id.clone();
        let provider = TokenProvider::new(client.clone(), account)?;
        Ok(Self {
            client,
            api_root: DEFAULT_API_ROOT.to_owned(),
            project_id,
            auth: Auth::ServiceAccount(provider),
        })
    }

    /// Creates a client for a local emulator at `host` (`localhost:8080`).
    ///
    /// # Errors
    ///
    /// Returns [`FirestoreError::Http`] if the `reqwest::Client` cannot be built.
    pub fn emulator(host: &str, project_id: &str, timeout_secs: u64) -> Result<Self, FirestoreError> {
        Ok(Self {
            client: build_http_client(timeout_secs)?,
            api_root: format!("http://{}/v1", host.trim_end_matches('/')),
            project_id: project_id.to_owned(),
            auth: Auth::Emulator,
        })
    }

    /// Points the client at a different API root (for testing with wiremock).
    #[must_use]
    pub fn with_api_root(mut self, api_root: &str) -> Self {
        self.api_root = api_root.trim_end_matches('/').to_owned();
        self
    }

    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Returns every document in `collection` whose integer `field` lies in
    /// `[min, max]` (inclusive), as raw REST documents.
    ///
    /// # Errors
    ///
    /// - [`FirestoreError::Http`] on network failure.
    /// - [`FirestoreError::UnexpectedStatus`] on a non-2xx answer.
    /// - [`FirestoreError::Deserialize`] for a malformed body.
    pub async fn query_range(
        &self,
        collection: &str,
        field: &str,
        min: i64,
        max: i64,
    ) -> Result<Vec<Value>, FirestoreError> {
        let body = json!({
            "structuredQuery": {
                "from": [{ "collectionId": collection }],
                "where": {
                    "compositeFilter": {
                        "op": "AND",
                        "filters": [
                            range_filter(field, "GREATER_THAN_OR_EQUAL", min),
                            range_filter(field, "LESS_THAN_OR_EQUAL", max),
                        ]
                    }
                }
            }
        });

        let url = format!("{}:runQuery", self.documents_url());
        let rows: Vec<Value> = self.post_json(&url, &body, "runQuery").await?;

        // Each row carries `readTime`; only rows with a `document` are hits.
        Ok(rows
            .into_iter()
            .filter_map(|mut row| row.get_mut("document").map(Value::take))
            .collect())
    }

    /// Commits `writes` atomically in one request. Returns how many writes
    /// were sent.
    ///
    /// # Errors
    ///
    /// Same as [`FirestoreClient::query_range`].
    pub async fn commit(&self, writes: Vec<Value>) -> Result<usize, FirestoreError> {
        let count = writes.len();
        let url = format!("{}:commit", self.documents_url());
        let _: Value = self
            .post_json(&url, &json!({ "writes": writes }), "commit")
            .await?;
        Ok(count)
    }

    /// Builds a create-only write of `record` into `collection` under a fresh
    /// random document id.
    #[must_use]
    pub fn create_write(&self, collection: &str, record: &serde_json::Map<String, Value>) -> Value {
        json!({
            "update": {
                "name": format!("{}/{collection}/{}", self.documents_name(), auto_id()),
                "fields": encode_fields(record),
            },
            "currentDocument": { "exists": false }
        })
    }

    /// `projects/{p}/databases/(default)/documents`, the resource name prefix.
    fn documents_name(&self) -> String {
        format!("projects/{}/databases/(default)/documents", self.project_id)
    }

    fn documents_url(&self) -> String {
        format!("{}/{}", self.api_root, self.documents_name())
    }

    async fn bearer(&self) -> Result<String, FirestoreError> {
        match &self.auth {
            Auth::ServiceAccount(provider) => provider.access_token().await,
            Auth::Emulator => Ok("owner".to_owned()),
        }
    }

    async fn post_json<T>(&self, url: &str, body: &Value, context: &str) -> Result<T, FirestoreError>
    where
        T: serde::de::DeserializeOwned,
    {
        let token = self.bearer().await?;
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(FirestoreError::UnexpectedStatus {
                status: status.as_u16(),
                context: context.to_owned(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| FirestoreError::Deserialize {
            context: context.to_owned(),
            source: e,
        })
    }
}

fn build_http_client(timeout_secs: u64) -> Result<Client, FirestoreError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .build()?)
}

fn range_filter(field: &str, op: &str, bound: i64) -> Value {
    json!({
        "fieldFilter": {
            "field": { "fieldPath": field },
            "op": op,
            "value": encode_value(&json!(bound)),
        }
    })
}

fn auto_id() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(AUTO_ID_LEN)
        .map(char::from)
        .collect()
}
