//! Request orchestrator: one request service per credential, threshold
//! handlers and the end-of-cycle completion gate.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use hosunlock_config::{ThresholdKey, TokenInfo};
use hosunlock_mi_api::codes::{
    STATUS_COOKIE_EXPIRED, STATUS_OTHER_FAILURE, STATUS_REQUEST_POTENTIALLY_VALID,
    STATUS_REQUEST_REJECTED, STATUS_SUCCESS,
};
use hosunlock_mi_api::{
    ApplyOutcome, ApplyPayload, Envelope, OutcomeResult, RequestService, ServiceFactory,
    StatusPayload,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::classify::evaluate_status_response;
use crate::error::{Error, Result};
use crate::outcome::{CycleSummary, ThresholdOutcome};

/// Drives the remote calls for every credential.
///
/// Threshold handlers run concurrently on a [`TaskTracker`]; the
/// interpretation of apply results is serialized behind a single-slot gate.
pub struct RequestOrchestrator<S: RequestService> {
    cancellation: CancellationToken,
    gate: tokio::sync::Mutex<()>,
    services: BTreeMap<TokenInfo, S>,
    summary: Mutex<CycleSummary>,
    tracker: TaskTracker,
}

impl<S: RequestService> RequestOrchestrator<S> {
    /// Builds one request service per credential, all bound to `cancellation`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceCreation`] if the factory fails for any credential.
    pub fn new<F>(factory: &F, tokens: &[TokenInfo], cancellation: CancellationToken) -> Result<Self>
    where
        F: ServiceFactory<Service = S>,
    {
        let mut services = BTreeMap::new();
        for token in tokens {
            let service = factory
                .create(token, cancellation.clone())
                .map_err(|source| Error::ServiceCreation {
                    token: token.index,
                    source,
                })?;
            services.insert(token.clone(), service);
        }

        debug!(count = services.len(), "request services created");

        Ok(Self {
            cancellation,
            gate: tokio::sync::Mutex::new(()),
            services,
            summary: Mutex::new(CycleSummary::default()),
            tracker: TaskTracker::new(),
        })
    }

    /// Runs the status check for every credential concurrently.
    ///
    /// # Errors
    ///
    /// Any single failure aborts the whole pre-check with [`Error::PreCheck`].
    pub async fn start(&self) -> Result<BTreeMap<TokenInfo, Envelope<StatusPayload>>> {
        let checks = self.services.keys().map(|token| async move {
            (token, self.run_single_status_check(token).await)
        });

        let mut results = BTreeMap::new();
        for (token, result) in join_all(checks).await {
            match result {
                Ok(envelope) => {
                    results.insert(token.clone(), envelope);
                }
                Err(source) => {
                    error!(token = token.index, "Pre-check failed. {token} could not retrieve status.");
                    return Err(Error::PreCheck {
                        token: token.index,
                        source: Box::new(source),
                    });
                }
            }
        }

        info!(count = results.len(), "pre-check completed");

        Ok(results)
    }

    /// Issues one status check for `token`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] when the envelope lacks a payload and
    /// [`Error::Transport`] when the call itself failed.
    pub async fn run_single_status_check(&self, token: &TokenInfo) -> Result<Envelope<StatusPayload>> {
        let service = self.service(token)?;
        let envelope = service.status_check().await.map_err(|source| {
            error!(token = token.index, "Error during status check for {token}: {source}");
            Error::Transport {
                operation: "status check",
                token: token.index,
                source,
            }
        })?;

        require_data(envelope, "status check", token)
    }

    /// Submits the unlock application for the credential behind `key`.
    ///
    /// # Errors
    ///
    /// Same classification as [`Self::run_single_status_check`].
    pub async fn apply_for_unlock(&self, key: &ThresholdKey) -> Result<Envelope<ApplyPayload>> {
        let token = key.token_info();
        let service = self.service(&token)?;
        let envelope = service.apply().await.map_err(|source| {
            error!(token = token.index, shift = key.shift_index, "Error applying for unlock with {key}: {source}");
            Error::Transport {
                operation: "apply",
                token: token.index,
                source,
            }
        })?;

        require_data(envelope, "apply", &token)
    }

    /// Cancels every in-flight request.
    pub fn stop(&self) {
        if !self.cancellation.is_cancelled() {
            info!("stopping request orchestrator");
        }
        self.cancellation.cancel();
    }

    /// Whether [`Self::stop`] was called or the shared token was cancelled.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Full handler for one exceeded threshold: apply, interpret and record.
    ///
    /// Failures are logged and recorded, never propagated.
    pub async fn handle_threshold(&self, key: &ThresholdKey) -> ThresholdOutcome {
        info!(token = key.token_index, shift = key.shift_index, "{key} - Applying for unlock...");

        let outcome = match self.apply_for_unlock(key).await {
            Ok(envelope) => self.process_apply_result(key, &envelope).await,
            Err(e) => outcome_from_error(&e),
        };

        debug!(token = key.token_index, shift = key.shift_index, "{key} finished: {outcome}");
        self.summary.lock().record(key.clone(), outcome.clone());

        outcome
    }

    /// Interprets an apply envelope by its code. Runs behind the gate so
    /// only one interpretation is active at a time.
    pub async fn process_apply_result(
        &self,
        key: &ThresholdKey,
        envelope: &Envelope<ApplyPayload>,
    ) -> ThresholdOutcome {
        let _slot = self.gate.lock().await;
        let deadline = envelope.data.as_ref().and_then(|data| data.deadline_format.clone());

        match envelope.code {
            STATUS_SUCCESS => {
                info!(
                    token = key.token_index,
                    shift = key.shift_index,
                    "{key} - Application details available! Deadline received: {}",
                    deadline.as_deref().unwrap_or("none"),
                );
                self.run_detailed_status_checks(key, envelope).await
            }
            STATUS_REQUEST_POTENTIALLY_VALID => {
                warn!(
                    token = key.token_index,
                    shift = key.shift_index,
                    "{key} - Application may have already been submitted. Deadline received: {}",
                    deadline.as_deref().unwrap_or("none"),
                );
                self.follow_up_status(key).await
            }
            STATUS_COOKIE_EXPIRED => {
                error!(token = key.token_index, shift = key.shift_index, "{key} - Cookie expired. Please update the cookie in the configuration.");
                ThresholdOutcome::CredentialExpired
            }
            STATUS_REQUEST_REJECTED | STATUS_OTHER_FAILURE => {
                warn!(token = key.token_index, shift = key.shift_index, "{key} - Application limit reached. You may only apply once every 30 days.");
                ThresholdOutcome::LimitReached { deadline }
            }
            code => {
                error!(
                    token = key.token_index,
                    shift = key.shift_index,
                    code,
                    "{key} - Unknown response code: {code}. Message: {}",
                    envelope.message.as_deref().unwrap_or("none"),
                );
                ThresholdOutcome::UnknownCode {
                    code,
                    message: envelope.message.clone(),
                }
            }
        }
    }

    /// Branches on the embedded apply result of a successful envelope.
    pub async fn run_detailed_status_checks(
        &self,
        key: &ThresholdKey,
        envelope: &Envelope<ApplyPayload>,
    ) -> ThresholdOutcome {
        let data = envelope.data.as_ref();
        let deadline = data.and_then(|data| data.deadline_format.clone());

        match data.map_or(ApplyOutcome::Unknown, ApplyPayload::apply_outcome) {
            ApplyOutcome::Successful => {
                info!(token = key.token_index, shift = key.shift_index, "{key} - Checking the detailed application status...");
                self.follow_up_status(key).await
            }
            ApplyOutcome::LimitReached => {
                warn!(
                    token = key.token_index,
                    shift = key.shift_index,
                    "{key}: Request limit reached, try again on {} (format is Month/Day of the current year).",
                    deadline.as_deref().unwrap_or("Not Specified"),
                );
                ThresholdOutcome::LimitReached { deadline }
            }
            ApplyOutcome::BlockedUntil => {
                error!(
                    token = key.token_index,
                    shift = key.shift_index,
                    "{key}: Request was blocked, try again on {} (format is Month/Day of the current year).",
                    deadline.as_deref().unwrap_or("Not Specified"),
                );
                ThresholdOutcome::BlockedUntil { deadline }
            }
            ApplyOutcome::Unknown => {
                warn!(token = key.token_index, shift = key.shift_index, "{key}: Unknown apply result received, skipping further processing...");
                ThresholdOutcome::UnknownApplyResult
            }
        }
    }

    /// Spawns [`Self::handle_threshold`] on the in-flight tracker.
    pub fn dispatch(self: &Arc<Self>, key: ThresholdKey) -> JoinHandle<ThresholdOutcome> {
        let orchestrator = Arc::clone(self);
        self.tracker
            .spawn(async move { orchestrator.handle_threshold(&key).await })
    }

    /// Number of dispatched handlers still running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// First half of the completion gate: the clock reported every threshold.
    pub fn mark_all_thresholds_reached(&self) {
        self.tracker.close();
    }

    /// Resolves once [`Self::mark_all_thresholds_reached`] was called and no
    /// handler is in flight.
    pub async fn wait_for_completion(&self) {
        self.tracker.wait().await;
        info!("Final processing complete.");
    }

    /// Whether the completion gate is open.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.tracker.is_closed() && self.tracker.is_empty()
    }

    /// Reopens the completion gate and forgets the previous cycle's outcomes.
    pub fn begin_cycle(&self) {
        self.tracker.reopen();
        self.summary.lock().clear();
    }

    /// Outcomes recorded in the current cycle.
    #[must_use]
    pub fn summary(&self) -> CycleSummary {
        self.summary.lock().clone()
    }

    fn service(&self, token: &TokenInfo) -> Result<&S> {
        self.services.get(token).ok_or_else(|| {
            error!(token = token.index, "No request service found for {token}.");
            Error::UnknownCredential(token.clone())
        })
    }

    async fn follow_up_status(&self, key: &ThresholdKey) -> ThresholdOutcome {
        let result = match self.run_single_status_check(&key.token_info()).await {
            Ok(envelope) => evaluate_status_response(&envelope, key.token_index, key),
            Err(e) => Err(e),
        };

        match result {
            Ok(OutcomeResult::Approved) => {
                info!(token = key.token_index, shift = key.shift_index, "{key}: Unlock request was approved, please try to unlock the bootloader on your device!");
                ThresholdOutcome::Approved
            }
            Ok(OutcomeResult::MaybeApproved) => {
                info!(
                    token = key.token_index,
                    shift = key.shift_index,
                    "{key}: Unlock request is in an uncertain state. Try to unlock the bootloader and run again for a new request if that fails."
                );
                ThresholdOutcome::MaybeApproved
            }
            Ok(other) => {
                error!(
                    token = key.token_index,
                    shift = key.shift_index,
                    "{key}: Unlock request was not approved ({other}), please try again later depending on the state of your account."
                );
                ThresholdOutcome::NotApproved(other)
            }
            Err(e) => outcome_from_error(&e),
        }
    }
}

fn require_data<T>(envelope: Envelope<T>, operation: &'static str, token: &TokenInfo) -> Result<Envelope<T>> {
    if envelope.data.is_some() {
        return Ok(envelope);
    }

    error!(
        token = token.index,
        code = envelope.code,
        "{token} - {operation} returned no data. Response Code: {}, Message: {}",
        envelope.code,
        envelope.message.as_deref().unwrap_or("none"),
    );

    Err(Error::Remote {
        operation,
        token: token.index,
        code: envelope.code,
        message: envelope.message,
    })
}

fn outcome_from_error(error: &Error) -> ThresholdOutcome {
    match error.status_code() {
        STATUS_COOKIE_EXPIRED => ThresholdOutcome::CredentialExpired,
        code => ThresholdOutcome::Failed {
            code,
            message: error.to_string(),
        },
    }
}
