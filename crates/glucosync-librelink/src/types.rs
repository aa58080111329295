//! LibreLinkUp response envelopes.
//!
//! Only the login payload is modelled as structs. Connection and feed records
//! stay as raw [`serde_json::Value`]s and are read through
//! [`crate::RecordView`], because their field names drift between app
//! versions.
//!
//! ## Observed shapes
//!
//! Every endpoint wraps its payload as `{"status": <int>, "data": ...}`.
//! Status `0` is success. Login additionally uses:
//! - `2`: bad credentials
//! - `4`: user action required in the app (`data.step.type`, e.g. `"tou"`)
//!
//! A login from the wrong region answers status `0` with
//! `{"redirect": true, "region": "eu"}` instead of a ticket.

use serde::Deserialize;

/// Generic `{status, data, error}` wrapper shared by all endpoints.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope {
    pub status: i64,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

/// `data` of a successful or redirected login.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    #[serde(default)]
    pub redirect: bool,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub user: Option<LoginUser>,
    #[serde(default)]
    pub auth_ticket: Option<AuthTicket>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginUser {
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthTicket {
    pub token: String,
    /// Epoch seconds.
    #[serde(default)]
    pub expires: i64,
}
