//! OAuth2 access tokens for a service account (JWT-bearer grant).
//!
//! The assertion is an RS256 JWT signed with the account's private key and
//! exchanged at `token_uri`. Tokens are cached until shortly before expiry,
//! so a run makes at most one exchange.

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::credentials::ServiceAccount;
use crate::error::FirestoreError;

const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Assertion lifetime. Google caps it at one hour.
const ASSERTION_TTL_SECS: i64 = 3_600;

/// Refresh this long before the token actually expires.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_TTL_SECS
}

struct CachedToken {
    access_token: String,
    expires_at: i64,
}

/// Issues and caches access tokens for one service account.
pub struct TokenProvider {
    client: Client,
    account: ServiceAccount,
    key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    /// # Errors
    ///
    /// - [`FirestoreError::Credentials`] if `client_email` or `private_key` is empty.
    /// - [`FirestoreError::Signing`] if the private key is not a valid RSA PEM.
    pub fn new(client: Client, account: ServiceAccount) -> Result<Self, FirestoreError> {
        if account.client_email.trim().is_empty() {
            return Err(FirestoreError::Credentials("client_email is empty".to_owned()));
        }
        if account.private_key.trim().is_empty() {
            return Err(FirestoreError::Credentials("private_key is empty".to_owned()));
        }
        let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())?;
        Ok(Self {
            client,
            account,
            key,
            cached: Mutex::new(None),
        })
    }

    /// Returns a valid access token, exchanging a fresh assertion if needed.
    ///
    /// # Errors
    ///
    /// - [`FirestoreError::Signing`] if the assertion cannot be signed.
    /// - [`FirestoreError::Http`] on network failure.
    /// - [`FirestoreError::UnexpectedStatus`] if the token endpoint refuses.
    /// - [`FirestoreError::Deserialize`] for a malformed token response.
    pub async fn access_token(&self) -> Result<String, FirestoreError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now().timestamp();
        if let Some(token) = cached.as_ref().filter(|t| t.expires_at - EXPIRY_MARGIN_SECS > now) {
            return Ok(token.access_token.clone());
        }

        let fresh = self.exchange(now).await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    async fn exchange(&self, now: i64) -> Result<CachedToken, FirestoreError> {
        let assertion = self.sign_assertion(now)?;
        let response = self
            .client
            .post(&self.account.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(FirestoreError::UnexpectedStatus {
                status: status.as_u16(),
                context: "token exchange".to_owned(),
                body,
            });
        }

        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| FirestoreError::Deserialize {
                context: "token response".to_owned(),
                source: e,
            })?;
        tracing::debug!(expires_in = token.expires_in, "obtained Firestore access token");

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: now + token.expires_in,
        })
    }

    fn sign_assertion(&self, now: i64) -> Result<String, FirestoreError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid.clone_from(&self.account.private_key_id);
        let claims = Claims {
            iss: &self.account.client_email,
            scope: DATASTORE_SCOPE,
            aud: &self.account.token_uri,
            iat: now,
            exp: now + ASSERTION_TTL_SECS,
        };
        Ok(jsonwebtoken::encode(&header, &claims, &self.key)?)
    }
}
