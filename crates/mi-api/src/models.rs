//! Wire payloads and the total mappings of their integer enums.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Uniform `{code, data, message}` wrapper around every API result.
///
/// `data` is absent exactly when the call failed logically.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct Envelope<T> {
    /// Status code, see [`crate::codes`].
    pub code: i32,

    /// Typed payload.
    pub data: Option<T>,

    /// Server-supplied message.
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    /// Envelope carrying a payload.
    pub const fn with_data(code: i32, data: T) -> Self {
        Self {
            code,
            data: Some(data),
            message: None,
        }
    }

    /// Envelope without a payload.
    pub fn without_data(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            data: None,
            message: Some(message.into()),
        }
    }
}

/// Payload of the status check call.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct StatusPayload {
    /// Raw approval state.
    #[serde(default = "unknown_code")]
    pub is_pass: i32,

    /// Raw button state.
    #[serde(default = "unknown_code")]
    pub button_state: i32,

    /// Date until which the account is blocked, e.g. "MM/DD".
    #[serde(default)]
    pub deadline_format: Option<String>,
}

impl StatusPayload {
    /// Approval state.
    #[must_use]
    pub fn is_pass_state(&self) -> IsPassState {
        IsPassState::from(self.is_pass)
    }

    /// Button state.
    #[must_use]
    pub fn button_state(&self) -> ButtonState {
        ButtonState::from(self.button_state)
    }
}

/// Payload of the apply call.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct ApplyPayload {
    /// Raw apply result, absent on some failures.
    #[serde(default)]
    pub apply_result: Option<i32>,

    /// Deadline shown when rate limited or blocked.
    #[serde(default)]
    pub deadline_format: Option<String>,
}

impl ApplyPayload {
    /// Apply result, `Unknown` when absent or unmapped.
    #[must_use]
    pub fn apply_outcome(&self) -> ApplyOutcome {
        self.apply_result.map_or(ApplyOutcome::Unknown, ApplyOutcome::from)
    }
}

const fn unknown_code() -> i32 {
    -1
}

/// Whether the account is already approved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IsPassState {
    /// Unmapped value.
    Unknown,
    /// Unlock already approved.
    RequestApproved,
    /// Not approved yet; the button state decides.
    MaybeCanProceed,
}

impl From<i32> for IsPassState {
    fn from(value: i32) -> Self {
        match value {
            1 => Self::RequestApproved,
            4 => Self::MaybeCanProceed,
            _ => Self::Unknown,
        }
    }
}

/// State of the apply button in the official client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ButtonState {
    /// Unmapped value.
    Unknown,
    /// A request can be submitted.
    RequestSubmissionPossible,
    /// Account blocked until a date.
    AccountBlockedFromApplyingUntilDate,
    /// Account younger than 30 days.
    AccountCreatedLessThan30DaysAgo,
}

impl From<i32> for ButtonState {
    fn from(value: i32) -> Self {
        match value {
            1 => Self::RequestSubmissionPossible,
            2 => Self::AccountBlockedFromApplyingUntilDate,
            3 => Self::AccountCreatedLessThan30DaysAgo,
            _ => Self::Unknown,
        }
    }
}

/// Interpretation of an apply response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ApplyOutcome {
    /// Unmapped or absent value.
    Unknown,
    /// Application accepted.
    Successful,
    /// Daily quota exhausted.
    LimitReached,
    /// Account blocked until a date.
    BlockedUntil,
}

impl From<i32> for ApplyOutcome {
    fn from(value: i32) -> Self {
        match value {
            1 => Self::Successful,
            3 => Self::LimitReached,
            4 => Self::BlockedUntil,
            _ => Self::Unknown,
        }
    }
}

/// Canonical interpretation of a status check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OutcomeResult {
    /// Needs manual verification.
    Unknown,
    /// Unlock approved.
    Approved,
    /// A request may still go through.
    MaybeApproved,
    /// Account cannot apply.
    Rejected,
    /// Application pending review.
    UnderReview,
    /// Quota exhausted.
    LimitReached,
    /// Check failed.
    Error,
}

impl fmt::Display for OutcomeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unknown => "unknown",
            Self::Approved => "approved",
            Self::MaybeApproved => "maybe approved",
            Self::Rejected => "rejected",
            Self::UnderReview => "under review",
            Self::LimitReached => "limit reached",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}
