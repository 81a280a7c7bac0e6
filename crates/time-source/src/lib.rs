//! Authoritative UTC time for the threshold clock.
//!
//! The [`TimeSource`] trait abstracts over where the instant comes from. The
//! production implementation is [`SntpTimeSource`], a minimal SNTPv4 client.
//! Tests use `MockTimeSource` (feature `test-helpers`), which follows tokio's
//! virtual clock so paused-time tests stay deterministic.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
#[cfg(any(test, feature = "test-helpers"))]
mod mock;
mod sntp;

pub use error::{Error, Result};
#[cfg(any(test, feature = "test-helpers"))]
pub use mock::MockTimeSource;
pub use sntp::{DEFAULT_NTP_SERVERS, DEFAULT_QUERY_TIMEOUT, SntpTimeSource};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A source of authoritative UTC time.
#[async_trait]
pub trait TimeSource: Send + Sync + 'static {
    /// Queries the current UTC instant, truncated to whole milliseconds.
    async fn now_utc(&self) -> Result<DateTime<Utc>>;
}
