//! Threshold clock.
//!
//! Establishes a time base from a [`hosunlock_time_source::TimeSource`],
//! computes one daily target per (credential, shift) pair and polls on a
//! fixed interval. Each target fires [`ClockEvent::ThresholdExceeded`] once
//! per attempt cycle; when all have fired the clock pauses and, after a short
//! settle delay, publishes [`ClockEvent::AllThresholdsReached`].
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod clock;
mod config;
mod error;
mod events;
mod target;

pub use clock::ThresholdClock;
pub use config::{ClockConfig, DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL, DEFAULT_SETTLE_DELAY};
pub use error::{Error, Result};
pub use events::{ClockEvent, ThresholdExceeded};
pub use target::{SERVICE_UTC_OFFSET_SECS, TimeTriple, compute_next_target, service_timezone};
