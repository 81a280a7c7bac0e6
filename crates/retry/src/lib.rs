//! Bounded retry policy for transient failures.
//!
//! Used by the time source query and by every outbound API call. Only errors
//! that report themselves as transient through [`Retryable`] are retried; all
//! other errors are returned on the first failure.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::fmt::Display;
use std::future::Future;
use std::io;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay between attempts.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Classifies an error as transient (worth retrying) or permanent.
pub trait Retryable {
    /// Whether a later attempt of the same operation may succeed.
    fn is_transient(&self) -> bool;
}

impl Retryable for io::Error {
    fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            io::ErrorKind::TimedOut
                | io::ErrorKind::WouldBlock
                | io::ErrorKind::Interrupted
                | io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::NotConnected
                | io::ErrorKind::AddrNotAvailable
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof
        )
    }
}

/// Retry policy with a fixed or linearly growing delay.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    multiply_by_attempt: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_BASE_DELAY, true)
    }
}

impl RetryPolicy {
    /// Creates a policy performing up to `max_retries` retries after the first
    /// attempt. When `multiply_by_attempt` is set the n-th retry waits
    /// `n * base_delay`, otherwise every retry waits `base_delay`.
    #[must_use]
    pub const fn new(max_retries: u32, base_delay: Duration, multiply_by_attempt: bool) -> Self {
        Self {
            max_retries,
            base_delay,
            multiply_by_attempt,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub const fn no_retries() -> Self {
        Self::new(0, Duration::ZERO, false)
    }

    /// Number of retries after the first attempt.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total number of attempts, including the first one.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Base delay between attempts.
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Whether the delay grows linearly with the retry number.
    #[must_use]
    pub const fn multiply_by_attempt(&self) -> bool {
        self.multiply_by_attempt
    }

    /// Delay before the given retry (1-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        if self.multiply_by_attempt {
            self.base_delay.saturating_mul(retry.max(1))
        } else {
            self.base_delay
        }
    }

    /// Runs `operation`, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the first permanent error, or the last transient error once the
    /// retry budget is exhausted.
    pub async fn execute<F, Fut, T, E>(&self, operation_name: &str, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        self.run(operation_name, None, operation).await
    }

    /// Like [`Self::execute`], but stops waiting between attempts once
    /// `cancellation` fires and returns the last error instead.
    ///
    /// # Errors
    ///
    /// Same as [`Self::execute`]; additionally returns the last transient
    /// error early when cancelled.
    pub async fn execute_with_cancellation<F, Fut, T, E>(
        &self,
        operation_name: &str,
        cancellation: &CancellationToken,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        self.run(operation_name, Some(cancellation), operation)
            .await
    }

    async fn run<F, Fut, T, E>(
        &self,
        operation_name: &str,
        cancellation: Option<&CancellationToken>,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(
                            operation = operation_name,
                            attempt, "operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    warn!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %e,
                        "operation failed after maximum retries"
                    );
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} failed (attempt {}/{}). Retrying in {}ms. Error: {}",
                        operation_name,
                        attempt,
                        max_attempts,
                        delay.as_millis(),
                        e
                    );

                    match cancellation {
                        Some(token) => {
                            tokio::select! {
                                () = token.cancelled() => return Err(e),
                                () = tokio::time::sleep(delay) => {}
                            }
                        }
                        None => tokio::time::sleep(delay).await,
                    }
                }
            }

            attempt += 1;
        }
    }
}
