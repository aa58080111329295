use thiserror::Error;

/// Errors returned by the LibreLinkUp API client.
#[derive(Debug, Error)]
pub enum LibreLinkError {
    /// Network or TLS failure, or a non-2xx status, from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// LibreLinkUp returned a non-zero `"status"` we have no specific mapping for.
    #[error("LibreLinkUp API error: {0}")]
    ApiError(String),

    /// Login rejected the email/password pair (status 2).
    #[error("LibreLinkUp rejected the account credentials")]
    InvalidCredentials,

    /// The account must accept updated terms in the mobile app first (status 4).
    #[error("LibreLinkUp account requires user action in the app: {0}")]
    TermsNotAccepted(String),

    /// Login redirected to another region a second time.
    #[error("LibreLinkUp redirected to region '{region}' again after the region retry")]
    RegionRedirectLoop { region: String },

    /// A data endpoint was called before a successful login.
    #[error("not authenticated; call login() first")]
    NotAuthenticated,

    /// The account has no patient connections.
    #[error("no patients are shared with this LibreLinkUp account")]
    NoPatients,

    /// No identifier could be recovered from the selected connection record.
    #[error("could not determine a patient id from the connection record")]
    PatientIdUnresolved,

    /// The endpoint does not exist for this account or API version.
    #[error("endpoint {path} unavailable (HTTP {status})")]
    EndpointUnavailable { path: String, status: u16 },

    /// The server is throttling or shedding load (HTTP 429 or 5xx).
    /// `retry_after` carries the server's `Retry-After` hint, if any.
    #[error("LibreLinkUp busy on {path} (HTTP {status})")]
    ServerBusy {
        path: String,
        status: u16,
        retry_after: Option<std::time::Duration>,
    },

    /// Client construction was given an unusable URL or header value.
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}
