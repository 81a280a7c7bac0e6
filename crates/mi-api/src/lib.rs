//! Client for the bootloader unlock API.
//!
//! Every call returns an [`Envelope`] and runs through the configured
//! [`hosunlock_retry::RetryPolicy`]. Integer enums on the wire map totally
//! onto Rust enums, with an `Unknown` variant for anything unrecognized.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod codes;
mod device;
mod error;
mod http;
#[cfg(any(test, feature = "test-helpers"))]
mod mock;
mod models;
mod service;

pub use device::{cookie_value, random_device_id};
pub use error::{Error, Result};
pub use http::{
    ApiConfig, DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT, HttpRequestService, HttpServiceFactory,
};
#[cfg(any(test, feature = "test-helpers"))]
pub use mock::{MockReply, MockRequestService, MockServiceFactory};
pub use models::{
    ApplyOutcome, ApplyPayload, ButtonState, Envelope, IsPassState, OutcomeResult, StatusPayload,
};
pub use service::{RequestService, ServiceFactory};
