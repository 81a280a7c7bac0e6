//! Request service seams.

use std::sync::Arc;

use async_trait::async_trait;
use hosunlock_config::TokenInfo;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{ApplyPayload, Envelope, StatusPayload};

/// The two remote operations, bound to a single credential.
#[async_trait]
pub trait RequestService: Send + Sync + 'static {
    /// Queries the unlock eligibility state.
    async fn status_check(&self) -> Result<Envelope<StatusPayload>>;

    /// Submits an unlock application.
    async fn apply(&self) -> Result<Envelope<ApplyPayload>>;
}

#[async_trait]
impl<S: RequestService> RequestService for Arc<S> {
    async fn status_check(&self) -> Result<Envelope<StatusPayload>> {
        self.as_ref().status_check().await
    }

    async fn apply(&self) -> Result<Envelope<ApplyPayload>> {
        self.as_ref().apply().await
    }
}

/// Builds one [`RequestService`] per credential.
pub trait ServiceFactory: Send + Sync + 'static {
    /// Service type produced.
    type Service: RequestService;

    /// Creates the service for `token`; `cancellation` aborts its calls.
    ///
    /// # Errors
    ///
    /// Returns an error if the service cannot be constructed.
    fn create(&self, token: &TokenInfo, cancellation: CancellationToken) -> Result<Self::Service>;
}
