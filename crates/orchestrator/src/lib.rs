//! Request orchestration for the unlock thresholds.
//!
//! [`RequestOrchestrator`] owns one request service per credential, runs the
//! pre-flight status checks, and handles each exceeded threshold by applying
//! and interpreting the result. Dispatched handlers are tracked so the
//! caller can wait until the clock has reported every threshold *and* no
//! handler is still in flight.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod classify;
mod error;
mod orchestrator;
mod outcome;

pub use classify::{PreCheckVerdict, evaluate_status_response, pre_check_verdict};
pub use error::{Error, Result};
pub use orchestrator::RequestOrchestrator;
pub use outcome::{CycleSummary, ThresholdOutcome};
