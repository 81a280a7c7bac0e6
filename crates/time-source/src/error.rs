//! Error types for time source queries.

use hosunlock_retry::Retryable;
use thiserror::Error;

/// Result type for time source operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while querying a time source.
#[derive(Debug, Error)]
pub enum Error {
    /// Server replied with a packet that cannot be used.
    #[error("invalid response from {server}: {reason}")]
    InvalidResponse {
        /// Server that replied.
        server: String,
        /// What was wrong with the reply.
        reason: &'static str,
    },

    /// Socket or resolver error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No servers configured.
    #[error("no time servers configured")]
    NoServers,

    /// Server did not reply in time.
    #[error("query to {0} timed out")]
    Timeout(String),
}

impl Retryable for Error {
    fn is_transient(&self) -> bool {
        match self {
            Self::Io(_) | Self::InvalidResponse { .. } | Self::Timeout(_) => true,
            Self::NoServers => false,
        }
    }
}
