//! Scripted request services for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hosunlock_config::TokenInfo;
use parking_lot::Mutex;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::models::{ApplyPayload, Envelope, StatusPayload};
use crate::service::{RequestService, ServiceFactory};

/// One scripted reply.
#[derive(Clone, Debug)]
pub enum MockReply<T> {
    /// Return this envelope.
    Envelope(Envelope<T>),
    /// Fail as if the server answered with this HTTP status.
    HttpStatus(StatusCode),
    /// Fail with a malformed-body error.
    MalformedBody,
}

#[derive(Debug)]
struct Script<T> {
    replies: VecDeque<MockReply<T>>,
}

impl<T: Clone> Script<T> {
    /// The last reply sticks once the queue drains to one entry.
    fn next(&mut self) -> Option<MockReply<T>> {
        if self.replies.len() > 1 {
            self.replies.pop_front()
        } else {
            self.replies.front().cloned()
        }
    }
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            replies: VecDeque::new(),
        }
    }
}

/// Request service that answers from per-operation scripts.
#[derive(Debug, Default)]
pub struct MockRequestService {
    apply_calls: AtomicU32,
    apply_script: Mutex<Script<ApplyPayload>>,
    cancellation: Mutex<Option<CancellationToken>>,
    delay: Mutex<Duration>,
    status_calls: AtomicU32,
    status_script: Mutex<Script<StatusPayload>>,
}

impl MockRequestService {
    /// Creates a service with empty scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a status check reply.
    pub fn push_status(&self, reply: MockReply<StatusPayload>) -> &Self {
        self.status_script.lock().replies.push_back(reply);
        self
    }

    /// Queues an apply reply.
    pub fn push_apply(&self, reply: MockReply<ApplyPayload>) -> &Self {
        self.apply_script.lock().replies.push_back(reply);
        self
    }

    /// Delays every reply, honoring cancellation.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Status checks served so far.
    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Apply calls served so far.
    pub fn apply_calls(&self) -> u32 {
        self.apply_calls.load(Ordering::SeqCst)
    }

    fn attach(&self, cancellation: CancellationToken) {
        *self.cancellation.lock() = Some(cancellation);
    }

    async fn reply<T: Clone>(&self, reply: Option<MockReply<T>>) -> Result<Envelope<T>> {
        let delay = *self.delay.lock();
        let cancellation = self.cancellation.lock().clone().unwrap_or_default();

        if cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if !delay.is_zero() {
            tokio::select! {
                () = cancellation.cancelled() => return Err(Error::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }

        match reply {
            Some(MockReply::Envelope(envelope)) => Ok(envelope),
            Some(MockReply::HttpStatus(status)) => Err(Error::Status(status)),
            Some(MockReply::MalformedBody) => Err(Error::Json(serde_json::Error::io(
                std::io::Error::other("malformed body"),
            ))),
            None => Err(Error::Status(StatusCode::NOT_IMPLEMENTED)),
        }
    }
}

#[async_trait]
impl RequestService for MockRequestService {
    async fn status_check(&self) -> Result<Envelope<StatusPayload>> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.status_script.lock().next();
        self.reply(reply).await
    }

    async fn apply(&self) -> Result<Envelope<ApplyPayload>> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.apply_script.lock().next();
        self.reply(reply).await
    }
}

/// Factory handing out one shared [`MockRequestService`] per token index.
#[derive(Debug, Default)]
pub struct MockServiceFactory {
    services: Mutex<HashMap<u32, Arc<MockRequestService>>>,
}

impl MockServiceFactory {
    /// Creates an empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Service for a token index, created on first use.
    pub fn service(&self, token_index: u32) -> Arc<MockRequestService> {
        Arc::clone(self.services.lock().entry(token_index).or_default())
    }
}

impl ServiceFactory for MockServiceFactory {
    type Service = Arc<MockRequestService>;

    fn create(&self, token: &TokenInfo, cancellation: CancellationToken) -> Result<Self::Service> {
        let service = self.service(token.index);
        service.attach(cancellation);
        Ok(service)
    }
}
