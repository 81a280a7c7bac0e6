//! Per-threshold outcomes and the end-of-cycle summary.

use std::collections::BTreeMap;
use std::fmt;

use hosunlock_config::ThresholdKey;
use hosunlock_mi_api::OutcomeResult;

/// What happened to one dispatched threshold.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ThresholdOutcome {
    /// Follow-up status check says approved.
    Approved,

    /// The server stopped accepting applications until a date.
    BlockedUntil {
        /// Server-supplied "MM/DD" deadline.
        deadline: Option<String>,
    },

    /// The session cookie expired.
    CredentialExpired,

    /// Apply or follow-up call failed.
    Failed {
        /// Best-known status code.
        code: i32,
        /// Error description.
        message: String,
    },

    /// Today's quota is used up.
    LimitReached {
        /// Server-supplied "MM/DD" deadline.
        deadline: Option<String>,
    },

    /// Follow-up status check is inconclusive but hopeful.
    MaybeApproved,

    /// Follow-up status check classified the account as not approved.
    NotApproved(OutcomeResult),

    /// Apply succeeded with an unrecognized result.
    UnknownApplyResult,

    /// Apply returned an unrecognized envelope code.
    UnknownCode {
        /// Envelope code.
        code: i32,
        /// Envelope message.
        message: Option<String>,
    },
}

impl ThresholdOutcome {
    /// Whether another attempt cycle would be pointless.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Approved | Self::BlockedUntil { .. } | Self::CredentialExpired | Self::MaybeApproved
        )
    }
}

impl fmt::Display for ThresholdOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::BlockedUntil { deadline } => {
                write!(f, "blocked until {}", deadline.as_deref().unwrap_or("an unspecified date"))
            }
            Self::CredentialExpired => write!(f, "cookie expired"),
            Self::Failed { code, message } => write!(f, "failed (code {code}): {message}"),
            Self::LimitReached { deadline } => write!(
                f,
                "limit reached, next try {}",
                deadline.as_deref().unwrap_or("not specified")
            ),
            Self::MaybeApproved => write!(f, "maybe approved"),
            Self::NotApproved(result) => write!(f, "not approved ({result})"),
            Self::UnknownApplyResult => write!(f, "unknown apply result"),
            Self::UnknownCode { code, .. } => write!(f, "unknown response code {code}"),
        }
    }
}

/// Outcomes recorded during one attempt cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleSummary {
    outcomes: BTreeMap<ThresholdKey, ThresholdOutcome>,
}

impl CycleSummary {
    /// Records the outcome of a threshold, replacing any earlier one.
    pub fn record(&mut self, key: ThresholdKey, outcome: ThresholdOutcome) {
        self.outcomes.insert(key, outcome);
    }

    /// Outcome recorded for `key`.
    #[must_use]
    pub fn get(&self, key: &ThresholdKey) -> Option<&ThresholdOutcome> {
        self.outcomes.get(key)
    }

    /// Recorded outcomes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&ThresholdKey, &ThresholdOutcome)> {
        self.outcomes.iter()
    }

    /// Number of recorded outcomes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Whether a new attempt cycle is worthwhile: nothing was approved or
    /// possibly approved, and no account is blocked or logged out.
    #[must_use]
    pub fn should_retry(&self) -> bool {
        !self.outcomes.values().any(ThresholdOutcome::is_terminal)
    }

    pub(crate) fn clear(&mut self) {
        self.outcomes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(token: u32, shift: u32) -> ThresholdKey {
        ThresholdKey::new(token, "secret", shift, 0)
    }

    #[test]
    fn test_empty_summary_retries() {
        assert!(CycleSummary::default().should_retry());
    }

    #[test]
    fn test_limit_and_failures_retry() {
        let mut summary = CycleSummary::default();
        summary.record(key(1, 1), ThresholdOutcome::LimitReached { deadline: None });
        summary.record(
            key(1, 2),
            ThresholdOutcome::Failed {
                code: -1,
                message: "timeout".to_string(),
            },
        );
        summary.record(key(2, 1), ThresholdOutcome::NotApproved(OutcomeResult::Rejected));

        assert!(summary.should_retry());
        assert_eq!(summary.len(), 3);
    }

    #[test]
    fn test_any_terminal_outcome_stops_retry() {
        for terminal in [
            ThresholdOutcome::Approved,
            ThresholdOutcome::MaybeApproved,
            ThresholdOutcome::CredentialExpired,
            ThresholdOutcome::BlockedUntil {
                deadline: Some("03/01".to_string()),
            },
        ] {
            let mut summary = CycleSummary::default();
            summary.record(key(1, 1), ThresholdOutcome::LimitReached { deadline: None });
            summary.record(key(1, 2), terminal);

            assert!(!summary.should_retry());
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ThresholdOutcome::LimitReached {
                deadline: Some("01/02".to_string())
            }
            .to_string(),
            "limit reached, next try 01/02"
        );
        assert_eq!(
            ThresholdOutcome::NotApproved(OutcomeResult::Unknown).to_string(),
            "not approved (unknown)"
        );
    }
}
