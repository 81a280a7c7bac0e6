//! Credentials, threshold keys and the application configuration.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod error;
mod token;

pub use config::{
    API_RETRY_WAIT_RANGE, AppConfig, ConfigOverrides, DEFAULT_CONFIG_FILE, MAX_API_RETRIES_RANGE,
    MAX_AUTO_RETRIES_RANGE,
};
pub use error::{Error, Result};
pub use token::{DEFAULT_TOKEN_VALUE, ThresholdKey, TokenInfo};
