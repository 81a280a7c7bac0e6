//! Events published by the threshold clock.

use chrono::{DateTime, FixedOffset, Local, Utc};
use hosunlock_config::ThresholdKey;

/// A threshold was crossed for the first time in the current cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThresholdExceeded {
    /// Threshold that fired.
    pub key: ThresholdKey,

    /// Corrected clock at the tick that fired, service timezone.
    pub service_local: DateTime<FixedOffset>,

    /// Corrected clock at the tick that fired, UTC.
    pub utc: DateTime<Utc>,
}

impl ThresholdExceeded {
    /// Firing instant in the caller's local timezone.
    #[must_use]
    pub fn local(&self) -> DateTime<Local> {
        self.utc.with_timezone(&Local)
    }
}

/// Events that can be emitted by the threshold clock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClockEvent {
    /// Every threshold of the current cycle has fired.
    AllThresholdsReached,

    /// `reset_and_restart` ran out of attempts.
    MaxRetriesReached,

    /// A single threshold fired.
    ThresholdExceeded(ThresholdExceeded),
}
