use thiserror::Error;

/// Errors returned by the Firestore client and writer.
#[derive(Debug, Error)]
pub enum FirestoreError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service-account blob is not usable.
    #[error("invalid service account: {0}")]
    Credentials(String),

    /// Signing the OAuth assertion failed (usually a malformed private key).
    #[error("token signing error: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    /// Firestore or the token endpoint answered with a non-2xx status.
    #[error("unexpected HTTP status {status} from {context}: {body}")]
    UnexpectedStatus {
        status: u16,
        context: String,
        body: String,
    },

    /// Commit groups must hold between 1 and 500 writes.
    #[error("batch size {0} outside 1..=500")]
    InvalidBatchSize(usize),

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}
