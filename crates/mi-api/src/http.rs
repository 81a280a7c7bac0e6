//! HTTP implementation of the request service.

use std::time::Duration;

use async_trait::async_trait;
use hosunlock_config::TokenInfo;
use hosunlock_retry::RetryPolicy;
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::device::{cookie_value, random_device_id};
use crate::error::{Error, Result};
use crate::models::{ApplyPayload, Envelope, StatusPayload};
use crate::service::{RequestService, ServiceFactory};

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://sgp-api.buy.mi.com/bbs/api/global/";

/// Per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const STATUS_ENDPOINT: &str = "user/bl-switch/state";
const APPLY_ENDPOINT: &str = "apply/bl-auth";
const APPLY_BODY: &str = r#"{"is_retry":true}"#;
const APPLY_USER_AGENT: &str = "okhttp/4.12.0";

/// Settings shared by every HTTP service.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// API root; endpoints are joined onto it.
    pub base_url: String,

    /// Retry policy for every call.
    pub retry: RetryPolicy,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl ApiConfig {
    /// Settings for the production API with the given retry policy.
    #[must_use]
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            retry,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

/// Request service talking to the remote API over HTTPS.
#[derive(Debug)]
pub struct HttpRequestService {
    base_url: Url,
    cancellation: CancellationToken,
    client: Client,
    retry: RetryPolicy,
    token_index: u32,
}

impl HttpRequestService {
    /// Creates a service for `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid, the token cannot be sent
    /// as a header, or the HTTP client cannot be built.
    pub fn new(token: &TokenInfo, config: &ApiConfig, cancellation: CancellationToken) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)?;

        let mut headers = HeaderMap::new();
        let mut cookie = HeaderValue::from_str(&cookie_value(&token.token, &random_device_id()))?;
        cookie.set_sensitive(true);
        headers.insert(COOKIE, cookie);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            base_url,
            cancellation,
            client,
            retry: config.retry,
            token_index: token.index,
        })
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        operation: &str,
    ) -> Result<Envelope<T>> {
        let url = self.base_url.join(endpoint)?;

        let call = self
            .retry
            .execute_with_cancellation(operation, &self.cancellation, || {
                self.send_once::<T>(method.clone(), url.clone())
            });

        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(Error::Cancelled),
            result = call => result,
        }
    }

    async fn send_once<T: DeserializeOwned>(&self, method: Method, url: Url) -> Result<Envelope<T>> {
        let mut request = self
            .client
            .request(method.clone(), url)
            .header(ACCEPT, "application/json");

        if method == Method::POST {
            request = request
                .header(USER_AGENT, APPLY_USER_AGENT)
                .header(CONTENT_TYPE, "application/json")
                .body(APPLY_BODY);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status(status));
        }

        let body = response.text().await?;
        let envelope: Envelope<T> = serde_json::from_str(&body)?;
        debug!(token = self.token_index, code = envelope.code, "API call completed");

        Ok(envelope)
    }
}

#[async_trait]
impl RequestService for HttpRequestService {
    async fn status_check(&self) -> Result<Envelope<StatusPayload>> {
        self.send(Method::GET, STATUS_ENDPOINT, "Mi API status check")
            .await
    }

    async fn apply(&self) -> Result<Envelope<ApplyPayload>> {
        self.send(Method::POST, APPLY_ENDPOINT, "Mi API apply request")
            .await
    }
}

/// Factory for [`HttpRequestService`]s sharing one [`ApiConfig`].
#[derive(Clone, Debug, Default)]
pub struct HttpServiceFactory {
    config: ApiConfig,
}

impl HttpServiceFactory {
    /// Creates a factory.
    #[must_use]
    pub const fn new(config: ApiConfig) -> Self {
        Self { config }
    }
}

impl ServiceFactory for HttpServiceFactory {
    type Service = HttpRequestService;

    fn create(&self, token: &TokenInfo, cancellation: CancellationToken) -> Result<Self::Service> {
        HttpRequestService::new(token, &self.config, cancellation)
    }
}
