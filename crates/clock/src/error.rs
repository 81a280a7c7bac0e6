//! Error types for the threshold clock.

use thiserror::Error;

/// Result type for clock operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the threshold clock.
#[derive(Debug, Error)]
pub enum Error {
    /// The session's cancellation token fired.
    #[error("clock operation cancelled")]
    Cancelled,

    /// An operation that needs a time base ran before `initialize`.
    #[error("clock has not been initialized")]
    NotInitialized,

    /// The clock was shut down.
    #[error("clock has been shut down")]
    ShutDown,

    /// The time source could not be queried, retries included.
    #[error("time source error: {0}")]
    TimeSource(#[from] hosunlock_time_source::Error),
}
