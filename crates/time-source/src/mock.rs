//! Scripted time source for tests.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::TimeSource;
use crate::error::{Error, Result};

/// Time source that reports a scripted instant advancing with tokio's clock.
///
/// Under `start_paused` the reported time only moves when virtual time does.
#[derive(Debug)]
pub struct MockTimeSource {
    anchor: Mutex<(DateTime<Utc>, Instant)>,
    failures_remaining: AtomicU32,
    queries: AtomicU32,
}

impl MockTimeSource {
    /// Creates a source that reports `now` at the current tokio instant.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            anchor: Mutex::new((now, Instant::now())),
            failures_remaining: AtomicU32::new(0),
            queries: AtomicU32::new(0),
        }
    }

    /// Re-anchors the reported time.
    pub fn set_now(&self, now: DateTime<Utc>) {
        *self.anchor.lock() = (now, Instant::now());
    }

    /// Makes the next `count` queries fail with a transient timeout.
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Number of queries made so far, failed ones included.
    pub fn query_count(&self) -> u32 {
        self.queries.load(Ordering::SeqCst)
    }

    fn current(&self) -> DateTime<Utc> {
        let (base, since) = *self.anchor.lock();
        let elapsed = TimeDelta::from_std(since.elapsed()).unwrap_or(TimeDelta::zero());
        base + elapsed
    }
}

#[async_trait]
impl TimeSource for MockTimeSource {
    async fn now_utc(&self) -> Result<DateTime<Utc>> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::Timeout("mock".to_string()));
        }

        let now = self.current();
        Ok(DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now))
    }
}
