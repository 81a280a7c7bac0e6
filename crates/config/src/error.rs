//! Configuration errors.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// Two tokens share the same index.
    #[error("duplicate token index {0}")]
    DuplicateIndex(u32),

    /// Two shifts share the same value.
    #[error("duplicate token shift {0}ms")]
    DuplicateShift(i32),

    /// A token index is not a positive integer.
    #[error("token index must be at least 1, got {0}")]
    InvalidIndex(u32),

    /// A token secret is blank or still the placeholder value.
    #[error("token #{0} is blank or still set to the placeholder value")]
    InvalidSecret(u32),

    /// The configuration file could not be read.
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the expected shape.
    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// No token shifts configured.
    #[error("at least one token shift must be configured")]
    NoShifts,

    /// No tokens configured.
    #[error("at least one token must be configured")]
    NoTokens,

    /// A command-line override is out of its allowed range.
    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        /// Setting name.
        name: &'static str,
        /// Provided value.
        value: i64,
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
    },
}
