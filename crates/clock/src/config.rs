//! Clock tunables.

use std::time::Duration;

use hosunlock_config::AppConfig;
use hosunlock_retry::RetryPolicy;

/// Default interval between poll ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default pause between the last threshold flag and `AllThresholdsReached`.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Default number of attempt cycles.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Threshold clock settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockConfig {
    /// Attempt cycles allowed, the initial one included.
    pub max_attempts: u32,

    /// Interval between poll ticks.
    pub poll_interval: Duration,

    /// Policy for time source queries.
    pub retry: RetryPolicy,

    /// Pause before announcing that every threshold was reached.
    pub settle_delay: Duration,
}

impl ClockConfig {
    /// Derives clock settings from the application configuration.
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.max_auto_retries(),
            retry: config.retry_policy(),
            ..Self::default()
        }
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry: RetryPolicy::default(),
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}
