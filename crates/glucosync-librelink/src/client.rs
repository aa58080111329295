//! HTTP client for the LibreLinkUp follower API.
//!
//! Wraps `reqwest` with the headers the mobile app sends, the login handshake
//! (including the one-shot region redirect), and the three read endpoints the
//! sync needs: connections, graph and logbook. Every response is checked for a
//! non-zero `"status"` in the JSON envelope.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CACHE_CONTROL, RETRY_AFTER};
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::error::LibreLinkError;
use crate::record::records_in;
use crate::retry::{parse_retry_after, RetryPolicy};
use crate::types::{ApiEnvelope, AuthTicket, LoginData, LoginUser};

/// Where a region redirect points. `{region}` is replaced with the code the
/// login response names (`eu`, `us`, `jp`, ...).
const DEFAULT_REGION_URL_TEMPLATE: &str = "https://api-{region}.libreview.io";

const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;

/// Client for the LibreLinkUp follower API.
///
/// Call [`LibreLinkClient::login`] once before any of the read methods.
pub struct LibreLinkClient {
    client: Client,
    base_url: Url,
    region_url_template: String,
    retry: RetryPolicy,
    session: Option<Session>,
}

struct Session {
    token: String,
    account_id: String,
}

enum LoginOutcome {
    Redirect(String),
    Authenticated { user: LoginUser, ticket: AuthTicket },
}

impl LibreLinkClient {
    /// Creates a client for the regional endpoint `base_url`.
    ///
    /// `client_version` is sent as the `version` header; LibreLinkUp rejects
    /// app versions it considers too old. `max_retries` applies to the read
    /// endpoints only.
    ///
    /// # Errors
    ///
    /// Returns [`LibreLinkError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`LibreLinkError::InvalidConfig`] if
    /// `base_url` or `client_version` is unusable.
    pub fn new(
        base_url: &str,
        client_version: &str,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self, LibreLinkError> {
        let version = HeaderValue::from_str(client_version).map_err(|e| {
            LibreLinkError::InvalidConfig(format!("client version '{client_version}': {e}"))
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("product"), HeaderValue::from_static("llu.android"));
        headers.insert(HeaderName::from_static("version"), version);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: parse_base_url(base_url)?,
            region_url_template: DEFAULT_REGION_URL_TEMPLATE.to_owned(),
            retry: RetryPolicy::new(max_retries, DEFAULT_BACKOFF_BASE_MS),
            session: None,
        })
    }

    /// Overrides the base delay used between read retries.
    #[must_use]
    pub fn with_backoff_base_ms(mut self, backoff_base_ms: u64) -> Self {
        self.retry.backoff_base_ms = backoff_base_ms;
        self
    }

    /// Overrides where region redirects point (for testing with wiremock).
    #[must_use]
    pub fn with_region_url_template(mut self, template: &str) -> Self {
        self.region_url_template = template.to_owned();
        self
    }

    /// The endpoint currently in use; changes after a region redirect.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Logs in and stores the session for subsequent calls.
    ///
    /// If the account lives in another region the API answers with a redirect;
    /// the client switches to that region and tries exactly once more.
    ///
    /// # Errors
    ///
    /// - [`LibreLinkError::InvalidCredentials`] for a rejected email/password.
    /// - [`LibreLinkError::TermsNotAccepted`] when the app demands user action.
    /// - [`LibreLinkError::RegionRedirectLoop`] if the retried login redirects again.
    /// - [`LibreLinkError::Http`] on network failure or non-2xx HTTP status.
    /// - [`LibreLinkError::Deserialize`] / [`LibreLinkError::ApiError`] for
    ///   malformed or unexpected responses.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<LoginUser, LibreLinkError> {
        let (user, ticket) = match self.login_once(email, password).await? {
            LoginOutcome::Authenticated { user, ticket } => (user, ticket),
            LoginOutcome::Redirect(region) => {
                let url = self.region_url(&region)?;
                tracing::info!(%region, url = %url, "account belongs to another region, retrying login");
                self.base_url = url;
                match self.login_once(email, password).await? {
                    LoginOutcome::Authenticated { user, ticket } => (user, ticket),
                    LoginOutcome::Redirect(region) => {
                        return Err(LibreLinkError::RegionRedirectLoop { region });
                    }
                }
            }
        };

        tracing::debug!(expires = ticket.expires, "LibreLinkUp session established");
        self.session = Some(Session {
            token: ticket.token,
            account_id: account_id(&user.id),
        });
        Ok(user)
    }

    /// Lists the patients shared with this account, as raw records.
    ///
    /// # Errors
    ///
    /// - [`LibreLinkError::NotAuthenticated`] before a successful login.
    /// - [`LibreLinkError::NoPatients`] if nobody is shared with the account.
    /// - [`LibreLinkError::ServerBusy`] once retries on 429/5xx are exhausted.
    /// - [`LibreLinkError::Http`] on network failure or other non-2xx status.
    /// - [`LibreLinkError::ApiError`] / [`LibreLinkError::Deserialize`] for
    ///   error envelopes or malformed bodies.
    pub async fn connections(&self) -> Result<Vec<Value>, LibreLinkError> {
        let data = self.get_data(&["llu", "connections"]).await?;
        let connections = records_in(&data, &["connections"]);
        if connections.is_empty() {
            return Err(LibreLinkError::NoPatients);
        }
        Ok(connections)
    }

    /// Fetches the recent high-resolution feed for `patient_id`.
    ///
    /// The connection's current reading (`connection.glucoseMeasurement`) is
    /// appended to the history because `graphData` usually stops a few
    /// minutes short of it.
    ///
    /// # Errors
    ///
    /// Same as [`LibreLinkClient::connections`], without the `NoPatients` case.
    pub async fn graph(&self, patient_id: &str) -> Result<Vec<Value>, LibreLinkError> {
        let data = self
            .get_data(&["llu", "connections", patient_id, "graph"])
            .await?;
        let mut records = records_in(&data, &["graphData", "graph_data"]);
        if let Some(latest) = data
            .get("connection")
            .and_then(|c| c.get("glucoseMeasurement").or_else(|| c.get("glucoseItem")))
            .filter(|m| m.is_object())
        {
            records.push(latest.clone());
        }
        Ok(records)
    }

    /// Fetches the longer, coarser logbook feed for `patient_id`.
    ///
    /// Accounts or API versions without a logbook yield an empty feed rather
    /// than an error.
    ///
    /// # Errors
    ///
    /// Same as [`LibreLinkClient::connections`], except that a missing
    /// endpoint is not an error.
    pub async fn logbook(&self, patient_id: &str) -> Result<Vec<Value>, LibreLinkError> {
        match self
            .get_data(&["llu", "connections", patient_id, "logbook"])
            .await
        {
            Ok(data) => Ok(records_in(&data, &["logbook", "entries"])),
            Err(LibreLinkError::EndpointUnavailable { path, status }) => {
                tracing::warn!(%path, status, "logbook unavailable, continuing with graph feed only");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn login_once(&self, email: &str, password: &str) -> Result<LoginOutcome, LibreLinkError> {
        let url = self.endpoint(&["llu", "auth", "login"])?;
        let response = self
            .client
            .post(url)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        let envelope = parse_envelope(&body, "login")?;

        match envelope.status {
            0 => {}
            2 => return Err(LibreLinkError::InvalidCredentials),
            4 => {
                let step = envelope
                    .data
                    .pointer("/step/type")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_owned();
                return Err(LibreLinkError::TermsNotAccepted(step));
            }
            other => return Err(api_error(&envelope, other)),
        }

        let data: LoginData =
            serde_json::from_value(envelope.data).map_err(|e| LibreLinkError::Deserialize {
                context: "login data".to_owned(),
                source: e,
            })?;

        if data.redirect {
            let region = data
                .region
                .filter(|r| !r.is_empty())
                .ok_or_else(|| LibreLinkError::ApiError("redirect without a region".to_owned()))?;
            return Ok(LoginOutcome::Redirect(region));
        }

        match (data.user, data.auth_ticket) {
            (Some(user), Some(ticket)) => Ok(LoginOutcome::Authenticated { user, ticket }),
            _ => Err(LibreLinkError::ApiError(
                "login succeeded without user or auth ticket".to_owned(),
            )),
        }
    }

    /// Authenticated GET returning the envelope's `data`. Throttling, 5xx
    /// and connection failures go through the retry policy.
    async fn get_data(&self, segments: &[&str]) -> Result<Value, LibreLinkError> {
        let session = self.session.as_ref().ok_or(LibreLinkError::NotAuthenticated)?;
        let url = self.endpoint(segments)?;
        let path = segments.join("/");
        let path = path.as_str();

        self.retry.run(|| {
            let url = url.clone();
            async move {
                let response = self
                    .client
                    .get(url)
                    .bearer_auth(&session.token)
                    .header("Account-Id", &session.account_id)
                    .send()
                    .await?;

                let status = response.status();
                if matches!(
                    status,
                    StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
                ) {
                    return Err(LibreLinkError::EndpointUnavailable {
                        path: path.to_owned(),
                        status: status.as_u16(),
                    });
                }
                if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    let retry_after = response
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| parse_retry_after(v, chrono::Utc::now()));
                    return Err(LibreLinkError::ServerBusy {
                        path: path.to_owned(),
                        status: status.as_u16(),
                        retry_after,
                    });
                }

                let body = response.error_for_status()?.text().await?;
                let envelope = parse_envelope(&body, path)?;
                if envelope.status != 0 {
                    return Err(api_error(&envelope, envelope.status));
                }
                Ok(envelope.data)
            }
        })
        .await
    }

    /// Appends percent-encoded `segments` to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, LibreLinkError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                LibreLinkError::InvalidConfig(format!("base URL '{}' cannot hold a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn region_url(&self, region: &str) -> Result<Url, LibreLinkError> {
        if !region.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(LibreLinkError::ApiError(format!(
                "refusing redirect to malformed region '{region}'"
            )));
        }
        parse_base_url(&self.region_url_template.replace("{region}", &region.to_ascii_lowercase()))
    }
}

/// Normalises the base URL to end with exactly one slash.
fn parse_base_url(raw: &str) -> Result<Url, LibreLinkError> {
    let normalised = format!("{}/", raw.trim().trim_end_matches('/'));
    Url::parse(&normalised)
        .map_err(|e| LibreLinkError::InvalidConfig(format!("invalid base URL '{raw}': {e}")))
}

fn parse_envelope(body: &str, context: &str) -> Result<ApiEnvelope, LibreLinkError> {
    serde_json::from_str(body).map_err(|e| LibreLinkError::Deserialize {
        context: context.to_owned(),
        source: e,
    })
}

fn api_error(envelope: &ApiEnvelope, status: i64) -> LibreLinkError {
    let message = envelope
        .error
        .as_ref()
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| format!("status {status}"));
    LibreLinkError::ApiError(message)
}

/// SHA-256 hex of the user id, sent as `Account-Id` by current app versions.
fn account_id(user_id: &str) -> String {
    format!("{:x}", Sha256::digest(user_id.as_bytes()))
}
