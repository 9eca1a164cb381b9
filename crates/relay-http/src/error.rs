//! REST errors
//!
//! Errors fall in three groups: never sent (`Closed`, `RateLimited`,
//! `Timeout`, `UrlEncoded`), sent and rejected (`Status`, `RetriesExhausted`)
//! and sent with a structured platform error (`Api`). A 429 under
//! cancel-on-rate-limit is `RetriesExhausted`, since it was sent.

use relay_core::ErrorKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Structured error body returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// REST client error
#[derive(Debug, Error)]
pub enum HttpError {
    /// The client was closed before the request started
    #[error("REST client is closed")]
    Closed,

    /// The bucket is exhausted and the client fails fast
    #[error("rate limited on {bucket}, retry after {retry_after:?}")]
    RateLimited { bucket: String, retry_after: Duration },

    /// The request deadline elapsed while waiting on a limit
    #[error("deadline elapsed while waiting on {bucket}")]
    Timeout { bucket: String },

    /// Too many consecutive 429 responses
    #[error("gave up on {bucket} after {attempts} rate limited attempts")]
    RetriesExhausted { bucket: String, attempts: u32 },

    /// Non-success status with a structured error body
    #[error("API error {status}: {error}")]
    Api { status: u16, error: ApiError },

    /// Non-success status with an unstructured body
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Connection or protocol failure below HTTP
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body did not match the expected shape
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Query or header value could not be form-encoded
    #[error("failed to url-encode request: {0}")]
    UrlEncoded(#[from] serde_urlencoded::ser::Error),
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl HttpError {
    /// Map the error onto the shared taxonomy
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Closed => ErrorKind::Closed,
            Self::RateLimited { .. } | Self::RetriesExhausted { .. } => {
                ErrorKind::RateLimitExceeded
            }
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Api { status, .. } | Self::Status { status, .. } => match status {
                401 | 403 => ErrorKind::Auth,
                _ => ErrorKind::Rejected,
            },
            Self::Transport(_) => ErrorKind::Transport,
            Self::Decode(_) | Self::UrlEncoded(_) => ErrorKind::Decode,
        }
    }

    /// Check if the request reached the server
    ///
    /// Transport failures count as not sent: delivery is unknown.
    #[must_use]
    pub fn was_sent(&self) -> bool {
        matches!(
            self,
            Self::Api { .. } | Self::Status { .. } | Self::RetriesExhausted { .. } | Self::Decode(_)
        )
    }

    #[must_use]
    pub fn is_api_error(&self) -> bool {
        matches!(self, Self::Api { .. })
    }

    /// HTTP status of a rejected request
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } | Self::Status { status, .. } => Some(*status),
            Self::RetriesExhausted { .. } => Some(429),
            _ => None,
        }
    }
}

/// Result type alias for REST operations
pub type HttpResult<T> = Result<T, HttpError>;
