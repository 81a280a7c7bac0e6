//! Error types for the request orchestrator.

use hosunlock_config::TokenInfo;
use hosunlock_mi_api::codes::{STATUS_COOKIE_EXPIRED, STATUS_OTHER_FAILURE};
use thiserror::Error;

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Domain error raised by the orchestrator. Every variant carries a remote
/// status code, see [`Error::status_code`].
#[derive(Debug, Error)]
pub enum Error {
    /// The credential's session cookie has expired.
    #[error("token #{token}: cookie expired, update it in the configuration")]
    CredentialExpired {
        /// Credential index.
        token: u32,
    },

    /// A pre-flight status check failed.
    #[error("pre-check failed for token #{token}: {source}")]
    PreCheck {
        /// Credential index.
        token: u32,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// The remote answered without a payload.
    #[error("{operation} failed for token #{token}: code {code}, message: {}", .message.as_deref().unwrap_or("none"))]
    Remote {
        /// Call that failed.
        operation: &'static str,
        /// Credential index.
        token: u32,
        /// Envelope code.
        code: i32,
        /// Envelope message.
        message: Option<String>,
    },

    /// A request service could not be built.
    #[error("failed to create request service for token #{token}: {source}")]
    ServiceCreation {
        /// Credential index.
        token: u32,
        /// Underlying failure.
        #[source]
        source: hosunlock_mi_api::Error,
    },

    /// Transport failure after retries, or cancellation.
    #[error("{operation} failed for token #{token}: {source}")]
    Transport {
        /// Call that failed.
        operation: &'static str,
        /// Credential index.
        token: u32,
        /// Underlying failure.
        #[source]
        source: hosunlock_mi_api::Error,
    },

    /// No request service is registered for the credential.
    #[error("no request service for {0}")]
    UnknownCredential(TokenInfo),
}

impl Error {
    /// Best-known remote status code; `-1` when there is none.
    #[must_use]
    pub fn status_code(&self) -> i32 {
        match self {
            Self::CredentialExpired { .. } => STATUS_COOKIE_EXPIRED,
            Self::PreCheck { source, .. } => source.status_code(),
            Self::Remote { code, .. } => *code,
            Self::ServiceCreation { .. } | Self::Transport { .. } | Self::UnknownCredential(_) => {
                STATUS_OTHER_FAILURE
            }
        }
    }
}
