//! Pure interpretation of status responses.

use std::collections::BTreeMap;
use std::fmt::Display;

use hosunlock_config::TokenInfo;
use hosunlock_mi_api::codes::STATUS_COOKIE_EXPIRED;
use hosunlock_mi_api::{ButtonState, Envelope, IsPassState, OutcomeResult, StatusPayload};
use tracing::{error, info, warn};

use crate::error::{Error, Result};

/// Classifies a status check response.
///
/// `label` prefixes every log line, e.g. `Token #1` or `Token #1 Shift #2`.
///
/// # Errors
///
/// Returns [`Error::CredentialExpired`] for the cookie-expired code and
/// [`Error::Remote`] when the envelope carries no payload.
pub fn evaluate_status_response(
    envelope: &Envelope<StatusPayload>,
    token_index: u32,
    label: impl Display,
) -> Result<OutcomeResult> {
    if envelope.code == STATUS_COOKIE_EXPIRED {
        error!(token = token_index, "{label} - Cookie expired. Please update the cookie in the configuration.");
        return Err(Error::CredentialExpired { token: token_index });
    }

    let Some(data) = envelope.data.as_ref() else {
        error!(token = token_index, code = envelope.code, "{label} - Status response carried no data.");
        return Err(Error::Remote {
            operation: "status check",
            token: token_index,
            code: envelope.code,
            message: envelope.message.clone(),
        });
    };

    info!(
        token = token_index,
        "{label} - Status received. is_pass: {}, button_state: {}, deadline_format: {}",
        data.is_pass,
        data.button_state,
        data.deadline_format.as_deref().unwrap_or("none"),
    );

    match data.is_pass_state() {
        IsPassState::Unknown => {
            warn!(token = token_index, "{label} - is_pass state is UNKNOWN. Please verify the account status manually.");
            return Ok(OutcomeResult::Unknown);
        }
        IsPassState::RequestApproved => {
            warn!(
                token = token_index,
                "{label} - Unlock request was already approved. Please try to unlock the bootloader on your device."
            );
            return Ok(OutcomeResult::Approved);
        }
        IsPassState::MaybeCanProceed => {
            info!(token = token_index, "{label} - Device may be eligible for unlocking.");
        }
    }

    match data.button_state() {
        ButtonState::RequestSubmissionPossible => {
            info!(token = token_index, "{label} - Button State: Request Submission Possible.");
            Ok(OutcomeResult::MaybeApproved)
        }
        ButtonState::AccountBlockedFromApplyingUntilDate => {
            info!(
                token = token_index,
                "{label} - Button State: Account Blocked From Applying Until: {}",
                data.deadline_format.as_deref().unwrap_or("not specified"),
            );
            Ok(OutcomeResult::Rejected)
        }
        ButtonState::AccountCreatedLessThan30DaysAgo => {
            info!(token = token_index, "{label} - Button State: Account Created Less Than 30 Days Ago.");
            Ok(OutcomeResult::Rejected)
        }
        ButtonState::Unknown => {
            warn!(token = token_index, "{label} - Button State is UNKNOWN. Please verify the account status manually.");
            Ok(OutcomeResult::Unknown)
        }
    }
}

/// Decision taken after the pre-flight status checks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PreCheckVerdict {
    /// Every credential may still apply.
    Proceed,

    /// A credential was already approved or rejected.
    AlreadyDecided {
        /// Credential index.
        token: u32,
        /// Classification of its status.
        result: OutcomeResult,
    },

    /// A credential is in a state that needs a manual look.
    NeedsManualCheck {
        /// Credential index.
        token: u32,
    },
}

impl PreCheckVerdict {
    /// Whether monitoring may start.
    #[must_use]
    pub const fn can_proceed(&self) -> bool {
        matches!(self, Self::Proceed)
    }
}

/// Classifies every pre-check response in credential order and returns the
/// first verdict that blocks monitoring.
///
/// # Errors
///
/// Propagates classification errors such as an expired cookie.
pub fn pre_check_verdict(
    results: &BTreeMap<TokenInfo, Envelope<StatusPayload>>,
) -> Result<PreCheckVerdict> {
    for (token, envelope) in results {
        match evaluate_status_response(envelope, token.index, token)? {
            OutcomeResult::MaybeApproved => {}
            OutcomeResult::Unknown => {
                return Ok(PreCheckVerdict::NeedsManualCheck { token: token.index });
            }
            result => {
                return Ok(PreCheckVerdict::AlreadyDecided {
                    token: token.index,
                    result,
                });
            }
        }
    }

    Ok(PreCheckVerdict::Proceed)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use super::*;

    fn status(code: i32, is_pass: i32, button_state: i32) -> Envelope<StatusPayload> {
        Envelope::with_data(
            code,
            StatusPayload {
                is_pass,
                button_state,
                deadline_format: Some("02/14".to_string()),
            },
        )
    }

    #[test]
    fn test_approved_wins_over_button_state() {
        for button_state in [-1, 1, 2, 3, 99] {
            let result = evaluate_status_response(&status(0, 1, button_state), 1, "Token #1").unwrap();
            assert_eq!(result, OutcomeResult::Approved);
        }
    }

    #[test]
    fn test_expired_cookie_is_an_error() {
        let error = evaluate_status_response(&status(100_004, 4, 1), 3, "Token #3").unwrap_err();

        assert!(matches!(error, Error::CredentialExpired { token: 3 }));
        assert_eq!(error.status_code(), 100_004);
    }

    #[test]
    fn test_expired_cookie_without_payload() {
        let envelope = Envelope::<StatusPayload>::without_data(100_004, "expired");
        let error = evaluate_status_response(&envelope, 1, "Token #1").unwrap_err();

        assert!(matches!(error, Error::CredentialExpired { .. }));
    }

    #[test]
    fn test_missing_payload_carries_code() {
        let envelope = Envelope::<StatusPayload>::without_data(100_001, "nope");
        let error = evaluate_status_response(&envelope, 2, "Token #2").unwrap_err();

        assert_eq!(error.status_code(), 100_001);
    }

    #[test]
    fn test_button_states() {
        let cases = [
            (1, OutcomeResult::MaybeApproved),
            (2, OutcomeResult::Rejected),
            (3, OutcomeResult::Rejected),
            (0, OutcomeResult::Unknown),
            (7, OutcomeResult::Unknown),
        ];

        for (button_state, expected) in cases {
            let result = evaluate_status_response(&status(0, 4, button_state), 1, "Token #1").unwrap();
            assert_eq!(result, expected, "button_state {button_state}");
        }
    }

    #[test]
    fn test_unknown_is_pass() {
        let result = evaluate_status_response(&status(0, 2, 1), 1, "Token #1").unwrap();
        assert_eq!(result, OutcomeResult::Unknown);
    }

    #[test]
    #[traced_test]
    fn test_logs_use_label() {
        evaluate_status_response(&status(0, 4, 9), 5, "Token #5 Shift #2").unwrap();

        assert!(logs_contain("Token #5 Shift #2 - Button State is UNKNOWN"));
    }

    fn results(entries: &[(u32, Envelope<StatusPayload>)]) -> BTreeMap<TokenInfo, Envelope<StatusPayload>> {
        entries
            .iter()
            .map(|(index, envelope)| (TokenInfo::new(format!("secret-{index}"), *index), envelope.clone()))
            .collect()
    }

    #[test]
    fn test_pre_check_proceeds_when_all_may_apply() {
        let verdict = pre_check_verdict(&results(&[(1, status(0, 4, 1)), (2, status(0, 4, 1))])).unwrap();

        assert_eq!(verdict, PreCheckVerdict::Proceed);
        assert!(verdict.can_proceed());
    }

    #[test]
    fn test_pre_check_stops_on_decided_account() {
        let verdict = pre_check_verdict(&results(&[(1, status(0, 4, 1)), (2, status(0, 4, 3))])).unwrap();

        assert_eq!(
            verdict,
            PreCheckVerdict::AlreadyDecided {
                token: 2,
                result: OutcomeResult::Rejected
            }
        );

        let verdict = pre_check_verdict(&results(&[(1, status(0, 1, 1))])).unwrap();
        assert_eq!(
            verdict,
            PreCheckVerdict::AlreadyDecided {
                token: 1,
                result: OutcomeResult::Approved
            }
        );
    }

    #[test]
    fn test_pre_check_stops_on_unknown() {
        let verdict = pre_check_verdict(&results(&[(1, status(0, 4, 0))])).unwrap();

        assert_eq!(verdict, PreCheckVerdict::NeedsManualCheck { token: 1 });
        assert!(!verdict.can_proceed());
    }

    #[test]
    fn test_pre_check_propagates_expired_cookie() {
        let error = pre_check_verdict(&results(&[(1, status(0, 4, 1)), (2, status(100_004, 4, 1))])).unwrap_err();

        assert!(matches!(error, Error::CredentialExpired { token: 2 }));
    }
}
