#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[cfg(feature = "client")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{operation} failed (status {status:?}): {detail}")]
    Remote {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Token store error: {0}")]
    Store(#[from] StoreError),
}

/// Failure of a call to the auth backend.
///
/// The validator never surfaces these to callers; they are folded into a
/// boolean outcome plus a [`Notice`](crate::Notice).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RemoteError {
    /// Backend answered with a non-2xx status (invalid or expired token).
    #[error("rejected by backend (status {status})")]
    Rejected { status: u16 },

    /// Connection, TLS or protocol failure before a status was received.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Request exceeded the client timeout.
    #[error("request timed out")]
    Timeout,

    /// 2xx response whose body did not match the expected shape.
    #[error("invalid response body: {0}")]
    Decode(String),

    /// The endpoint URL could not be built from the configuration.
    #[error("invalid endpoint: {0}")]
    Endpoint(String),
}

impl RemoteError {
    /// `true` for failures that say nothing about the credential itself.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout)
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Failure of an authorized call to an admin resource.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ApiError {
    /// No credential is stored; the request was not sent.
    #[error("not logged in")]
    NoCredential,

    /// The backend refused the credential. The session has been ended.
    #[error("unauthorized (status {status})")]
    Unauthorized { status: u16 },

    /// Any other non-2xx answer. The session is left alone.
    #[error("request failed (status {status}): {detail}")]
    Status { status: u16, detail: String },

    #[error("invalid endpoint: {0}")]
    Endpoint(String),

    #[cfg(feature = "client")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ApiError {
    /// `true` if the error means the user has to log in again.
    #[must_use]
    pub fn ends_session(&self) -> bool {
        matches!(self, Self::NoCredential | Self::Unauthorized { .. })
    }
}
