use thiserror::Error;

/// CLI-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Clock failure.
    #[error(transparent)]
    Clock(#[from] hosunlock_clock::Error),

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] hosunlock_config::Error),

    /// Reading the operator's answer failed.
    #[error("failed to read from stdin: {0}")]
    Io(#[from] std::io::Error),

    /// Request orchestrator failure.
    #[error(transparent)]
    Orchestrator(#[from] hosunlock_orchestrator::Error),
}
