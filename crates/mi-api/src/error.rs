//! Error types for the remote API client.

use hosunlock_retry::Retryable;
use thiserror::Error;

/// Result type for remote API calls.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while calling the remote API.
#[derive(Debug, Error)]
pub enum Error {
    /// The shared cancellation token fired.
    #[error("the API request was cancelled")]
    Cancelled,

    /// Transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Credential cannot be encoded as a header value.
    #[error("invalid cookie header: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    /// Response body is not the expected JSON envelope.
    #[error("failed to parse API response JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Server replied with a non-success HTTP status.
    #[error("unexpected HTTP status {0}")]
    Status(reqwest::StatusCode),

    /// Endpoint could not be joined onto the base URL.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl Retryable for Error {
    fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => !e.is_builder() && !e.is_redirect(),
            Self::Status(_) => true,
            Self::Cancelled | Self::InvalidHeader(_) | Self::Json(_) | Self::Url(_) => false,
        }
    }
}
