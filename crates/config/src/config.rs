//! Application configuration model, validation and loading.

use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hosunlock_retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::token::{ThresholdKey, TokenInfo};

/// File name looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "appsettings.json";

/// Allowed range for the Threshold Clock attempt maximum.
pub const MAX_AUTO_RETRIES_RANGE: RangeInclusive<u32> = 1..=365;

/// Allowed range for resilience retries per call.
pub const MAX_API_RETRIES_RANGE: RangeInclusive<u32> = 0..=10;

/// Allowed range for the resilience base delay in milliseconds.
pub const API_RETRY_WAIT_RANGE: RangeInclusive<u32> = 1..=1000;

const DEFAULT_MAX_AUTO_RETRIES: u32 = 5;
const DEFAULT_MAX_API_RETRIES: u32 = 3;
const DEFAULT_API_RETRY_WAIT_MS: u32 = 100;

/// Top-level configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AppConfig {
    /// Credentials, one service per entry.
    pub tokens: Vec<TokenInfo>,

    /// Millisecond offsets applied ahead of the daily anchor.
    pub token_shifts: Vec<i32>,

    /// Skip the interactive start prompt.
    pub auto_run_on_start: bool,

    /// Attempt cycles the Threshold Clock may run.
    pub max_auto_retries: u32,

    /// Retries per outbound call after the first attempt.
    pub max_api_retries: u32,

    /// Base delay between outbound call retries.
    pub api_retry_wait_time_ms: u32,

    /// Scale the base delay by the retry number.
    pub multiply_api_retry_wait_time_by_attempt: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tokens: vec![TokenInfo::new(crate::token::DEFAULT_TOKEN_VALUE, 1)],
            token_shifts: vec![0],
            auto_run_on_start: false,
            max_auto_retries: DEFAULT_MAX_AUTO_RETRIES,
            max_api_retries: DEFAULT_MAX_API_RETRIES,
            api_retry_wait_time_ms: DEFAULT_API_RETRY_WAIT_MS,
            multiply_api_retry_wait_time_by_attempt: true,
        }
    }
}

impl AppConfig {
    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and [`Error::Json`]
    /// if it does not parse.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = serde_json::from_str(&raw)?;
        info!(path = %path.display(), "loaded configuration");

        Ok(config)
    }

    /// Like [`Self::load_from_file`], but a missing file yields the default
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for any failure other than the file not existing.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match Self::load_from_file(path) {
            Err(Error::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "configuration file not found, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Checks that the configuration can drive a run.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<()> {
        if self.tokens.is_empty() {
            return Err(Error::NoTokens);
        }

        let mut indexes = HashSet::new();
        for token in &self.tokens {
            if token.index < 1 {
                return Err(Error::InvalidIndex(token.index));
            }
            if token.has_placeholder_secret() {
                return Err(Error::InvalidSecret(token.index));
            }
            if !indexes.insert(token.index) {
                return Err(Error::DuplicateIndex(token.index));
            }
        }

        if self.token_shifts.is_empty() {
            return Err(Error::NoShifts);
        }

        let mut shifts = HashSet::new();
        for shift in &self.token_shifts {
            if !shifts.insert(*shift) {
                return Err(Error::DuplicateShift(*shift));
            }
        }

        Ok(())
    }

    /// Every (credential, shift) pair, ordered by token index then shift
    /// position.
    #[must_use]
    pub fn threshold_keys(&self) -> Vec<ThresholdKey> {
        let mut tokens: Vec<&TokenInfo> = self.tokens.iter().collect();
        tokens.sort();

        tokens
            .into_iter()
            .flat_map(|token| {
                self.token_shifts
                    .iter()
                    .zip(1u32..)
                    .map(|(shift, position)| {
                        ThresholdKey::new(token.index, token.token.clone(), position, *shift)
                    })
            })
            .collect()
    }

    /// Attempt maximum for the Threshold Clock, clamped to its range.
    #[must_use]
    pub fn max_auto_retries(&self) -> u32 {
        clamp(self.max_auto_retries, &MAX_AUTO_RETRIES_RANGE)
    }

    /// Resilience retries per call, clamped to its range.
    #[must_use]
    pub fn max_api_retries(&self) -> u32 {
        clamp(self.max_api_retries, &MAX_API_RETRIES_RANGE)
    }

    /// Resilience base delay, clamped to its range.
    #[must_use]
    pub fn api_retry_wait(&self) -> Duration {
        Duration::from_millis(u64::from(clamp(
            self.api_retry_wait_time_ms,
            &API_RETRY_WAIT_RANGE,
        )))
    }

    /// Resilience policy built from the clamped settings.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_api_retries(),
            self.api_retry_wait(),
            self.multiply_api_retry_wait_time_by_attempt,
        )
    }

    /// Applies command-line overrides after checking their ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] for the first override outside its range.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) -> Result<()> {
        if let Some(value) = overrides.max_auto_retries {
            check_range("max-retries", value, &MAX_AUTO_RETRIES_RANGE)?;
            self.max_auto_retries = value;
        }
        if let Some(value) = overrides.max_api_retries {
            check_range("max-api-retries", value, &MAX_API_RETRIES_RANGE)?;
            self.max_api_retries = value;
        }
        if let Some(value) = overrides.api_retry_wait_ms {
            check_range("api-retry-wait", value, &API_RETRY_WAIT_RANGE)?;
            self.api_retry_wait_time_ms = value;
        }
        if overrides.auto_run {
            self.auto_run_on_start = true;
        }
        if overrides.fixed_retry_wait {
            self.multiply_api_retry_wait_time_by_attempt = false;
        }

        Ok(())
    }
}

/// Values supplied on the command line that take precedence over the file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Configuration file path.
    pub config_path: Option<PathBuf>,

    /// Force auto-run.
    pub auto_run: bool,

    /// Threshold Clock attempt maximum.
    pub max_auto_retries: Option<u32>,

    /// Resilience retries per call.
    pub max_api_retries: Option<u32>,

    /// Resilience base delay in milliseconds.
    pub api_retry_wait_ms: Option<u32>,

    /// Disable linear scaling of the retry delay.
    pub fixed_retry_wait: bool,
}

impl ConfigOverrides {
    /// Path to load, falling back to [`DEFAULT_CONFIG_FILE`].
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }
}

fn clamp<T: Copy + Ord>(value: T, range: &RangeInclusive<T>) -> T {
    value.clamp(*range.start(), *range.end())
}

fn check_range<T>(name: &'static str, value: T, range: &RangeInclusive<T>) -> Result<()>
where
    T: Copy + PartialOrd + Into<i64>,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(Error::OutOfRange {
            name,
            value: value.into(),
            min: (*range.start()).into(),
            max: (*range.end()).into(),
        })
    }
}
