//! Drift-corrected clock that fires each threshold at most once per cycle.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use hosunlock_config::ThresholdKey;
use hosunlock_time_source::TimeSource;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ClockConfig;
use crate::error::{Error, Result};
use crate::events::{ClockEvent, ThresholdExceeded};
use crate::target::{TimeTriple, compute_next_target, service_timezone};

const MIN_EVENT_CHANNEL_CAPACITY: usize = 256;
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Authoritative instant paired with the monotonic instant it was observed at.
#[derive(Clone, Copy, Debug)]
struct TimeBase {
    at: Instant,
    utc: DateTime<Utc>,
}

impl TimeBase {
    fn new(utc: DateTime<Utc>) -> Self {
        Self {
            at: Instant::now(),
            utc,
        }
    }

    fn advance(&mut self) -> DateTime<Utc> {
        let now = Instant::now();
        self.utc += TimeDelta::from_std(now - self.at).unwrap_or(TimeDelta::zero());
        self.at = now;
        self.utc
    }

    fn now(&self) -> DateTime<Utc> {
        self.utc + TimeDelta::from_std(self.at.elapsed()).unwrap_or(TimeDelta::zero())
    }
}

#[derive(Clone, Copy, Debug)]
struct ThresholdEntry {
    flagged: bool,
    target: DateTime<FixedOffset>,
}

/// Mutable clock state. `entries[i]` belongs to `Inner::keys[i]`.
#[derive(Debug, Default)]
struct ClockState {
    base: Option<TimeBase>,
    entries: Vec<ThresholdEntry>,
    generation: u64,
}

impl ClockState {
    fn all_flagged(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(|entry| entry.flagged)
    }
}

struct Inner<T: TimeSource> {
    attempt: AtomicU32,
    cancellation: CancellationToken,
    config: ClockConfig,
    events: broadcast::Sender<ClockEvent>,
    keys: Vec<ThresholdKey>,
    poll_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    running: watch::Sender<bool>,
    shutdown: CancellationToken,
    state: Mutex<ClockState>,
    time_source: Arc<T>,
}

/// Tracks one target instant per threshold key and publishes
/// [`ClockEvent`]s as they are crossed.
///
/// Cloning yields another handle to the same clock.
pub struct ThresholdClock<T: TimeSource> {
    inner: Arc<Inner<T>>,
}

impl<T: TimeSource> Clone for ThresholdClock<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: TimeSource> ThresholdClock<T> {
    /// Creates an uninitialized clock for the given threshold keys.
    pub fn new(config: ClockConfig, time_source: Arc<T>, keys: Vec<ThresholdKey>) -> Self {
        Self::with_cancellation(config, time_source, keys, CancellationToken::new())
    }

    /// Like [`Self::new`], but bound to a session token: cancelling it aborts
    /// pending time source queries and stops the poll loop.
    pub fn with_cancellation(
        config: ClockConfig,
        time_source: Arc<T>,
        keys: Vec<ThresholdKey>,
        cancellation: CancellationToken,
    ) -> Self {
        // One cycle publishes every key once plus two summary events.
        let capacity = MIN_EVENT_CHANNEL_CAPACITY.max(keys.len() + 2);
        let (events, _) = broadcast::channel(capacity);
        let (running, _) = watch::channel(false);
        let shutdown = cancellation.child_token();

        Self {
            inner: Arc::new(Inner {
                attempt: AtomicU32::new(0),
                cancellation,
                config,
                events,
                keys,
                poll_task: parking_lot::Mutex::new(None),
                running,
                shutdown,
                state: Mutex::new(ClockState::default()),
                time_source,
            }),
        }
    }

    /// Subscribes to clock events.
    ///
    /// The channel holds at least one full cycle of events. A receiver that
    /// falls further behind gets [`broadcast::error::RecvError::Lagged`] and
    /// should log it and keep receiving.
    pub fn subscribe(&self) -> broadcast::Receiver<ClockEvent> {
        self.inner.events.subscribe()
    }

    /// Establishes the time base, computes every target and starts polling.
    ///
    /// Calling it again after success is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimeSource`] once time source retries are exhausted,
    /// [`Error::Cancelled`] when the session token fires and
    /// [`Error::ShutDown`] after [`Self::shutdown`].
    pub async fn initialize(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if state.base.is_some() {
            debug!("clock already initialized");
            return Ok(());
        }
        self.inner.ensure_active()?;

        let now = self.inner.query_time().await?;
        state.base = Some(TimeBase::new(now));
        state.entries = self.inner.compute_entries(now);
        drop(state);

        info!(
            "Initial time obtained: {} (service time: {})",
            now.format(TIME_FORMAT),
            now.with_timezone(&service_timezone()).format(TIME_FORMAT)
        );

        self.inner.running.send_replace(true);
        let handle = tokio::spawn(Arc::clone(&self.inner).poll_loop());
        *self.inner.poll_task.lock() = Some(handle);

        Ok(())
    }

    /// Whether every threshold of the current cycle has fired.
    pub async fn were_all_thresholds_reached(&self) -> bool {
        self.inner.state.lock().await.all_flagged()
    }

    /// Corrected current time in all three references.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] before [`Self::initialize`].
    pub async fn current_times(&self) -> Result<TimeTriple> {
        let state = self.inner.state.lock().await;
        let base = state.base.as_ref().ok_or(Error::NotInitialized)?;

        Ok(TimeTriple::from(base.now()))
    }

    /// Target of every threshold in all three references.
    pub async fn threshold_snapshots(&self) -> BTreeMap<ThresholdKey, TimeTriple> {
        let state = self.inner.state.lock().await;

        self.inner
            .keys
            .iter()
            .zip(&state.entries)
            .map(|(key, entry)| (key.clone(), TimeTriple::from(entry.target)))
            .collect()
    }

    /// Starts a new attempt cycle.
    ///
    /// Returns `false` and publishes [`ClockEvent::MaxRetriesReached`] when
    /// the attempt budget is used up; the clock then stays stopped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] before [`Self::initialize`],
    /// [`Error::ShutDown`] after [`Self::shutdown`] and [`Error::TimeSource`]
    /// if the time base cannot be refreshed.
    pub async fn reset_and_restart(&self) -> Result<bool> {
        let mut state = self.inner.state.lock().await;
        if state.base.is_none() {
            return Err(Error::NotInitialized);
        }
        self.inner.ensure_active()?;

        let max_attempts = self.inner.config.max_attempts;
        let previous = self.inner.attempt.load(Ordering::SeqCst);
        if previous >= max_attempts {
            warn!(max_attempts, "no attempts remain, reset ignored");
            return Ok(false);
        }

        let attempt = previous + 1;
        self.inner.attempt.store(attempt, Ordering::SeqCst);

        if attempt >= max_attempts {
            drop(state);
            self.inner.running.send_replace(false);
            warn!(
                "Maximum retry attempts ({}) reached. Please restart the application.",
                max_attempts
            );
            let _ = self.inner.events.send(ClockEvent::MaxRetriesReached);
            return Ok(false);
        }

        info!("Resetting for attempt {} of {}...", attempt + 1, max_attempts);

        let now = self.inner.query_time().await?;
        state.base = Some(TimeBase::new(now));
        state.entries = self.inner.compute_entries(now);
        state.generation += 1;
        self.inner.running.send_replace(true);
        drop(state);

        info!(
            "Thresholds reset. Time: {} (service time: {})",
            now.format(TIME_FORMAT),
            now.with_timezone(&service_timezone()).format(TIME_FORMAT)
        );

        Ok(true)
    }

    /// Pauses polling without touching threshold state.
    pub fn stop(&self) {
        self.inner.running.send_replace(false);
        info!("clock timer stopped");
    }

    /// Resumes polling, unless no attempts remain.
    pub fn resume(&self) {
        if !self.can_retry() {
            warn!("Cannot resume: maximum retry attempts reached.");
            return;
        }

        self.inner.running.send_replace(true);
        info!("clock timer resumed");
    }

    /// Whether the poll timer is active.
    pub fn is_running(&self) -> bool {
        *self.inner.running.borrow()
    }

    /// Whether another attempt cycle may start.
    pub fn can_retry(&self) -> bool {
        self.attempt_count() < self.inner.config.max_attempts
    }

    /// Attempt cycles still available.
    pub fn remaining_attempts(&self) -> u32 {
        self.inner
            .config
            .max_attempts
            .saturating_sub(self.attempt_count())
    }

    /// Resets performed so far.
    pub fn attempt_count(&self) -> u32 {
        self.inner.attempt.load(Ordering::SeqCst)
    }

    /// Stops the poll loop for good and waits for it to exit.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.running.send_replace(false);

        let handle = self.inner.poll_task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "clock poll task ended abnormally");
            }
        }

        debug!("clock shut down");
    }
}

impl<T: TimeSource> Inner<T> {
    fn ensure_active(&self) -> Result<()> {
        if self.cancellation.is_cancelled() {
            Err(Error::Cancelled)
        } else if self.shutdown.is_cancelled() {
            Err(Error::ShutDown)
        } else {
            Ok(())
        }
    }

    async fn query_time(&self) -> Result<DateTime<Utc>> {
        let query = self
            .config
            .retry
            .execute_with_cancellation("NTP Query", &self.shutdown, || {
                self.time_source.now_utc()
            });

        tokio::select! {
            biased;

            () = self.shutdown.cancelled() => {
                self.ensure_active()?;
                Err(Error::ShutDown)
            }
            result = query => Ok(result?),
        }
    }

    fn compute_entries(&self, now: DateTime<Utc>) -> Vec<ThresholdEntry> {
        self.keys
            .iter()
            .map(|key| ThresholdEntry {
                flagged: false,
                target: compute_next_target(now, key.shift_ms),
            })
            .collect()
    }

    async fn poll_loop(self: Arc<Self>) {
        let mut running = self.running.subscribe();
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if !*running.borrow_and_update() {
                tokio::select! {
                    () = self.shutdown.cancelled() => break,
                    changed = running.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        interval.reset_immediately();
                        continue;
                    }
                }
            }

            tokio::select! {
                () = self.shutdown.cancelled() => break,
                changed = running.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = interval.tick() => {}
            }

            if let Some(generation) = self.tick().await {
                tokio::select! {
                    () = self.shutdown.cancelled() => break,
                    () = tokio::time::sleep(self.config.settle_delay) => {}
                }
                self.finish_cycle(generation).await;
            }
        }

        debug!("clock poll loop stopped");
    }

    /// Runs one poll tick. Returns the cycle generation when this tick
    /// flagged the last outstanding threshold.
    async fn tick(&self) -> Option<u64> {
        let mut fired = Vec::new();

        let generation = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let utc = state.base.as_mut()?.advance();
            let service_local = utc.with_timezone(&service_timezone());

            for (key, entry) in self.keys.iter().zip(state.entries.iter_mut()) {
                if !entry.flagged && service_local >= entry.target {
                    entry.flagged = true;
                    fired.push(ThresholdExceeded {
                        key: key.clone(),
                        service_local,
                        utc,
                    });
                }
            }

            let completed = !fired.is_empty() && state.all_flagged();
            if completed {
                self.running.send_replace(false);
                debug!("all thresholds flagged, polling paused");
            }

            completed.then_some(state.generation)
        };

        for event in fired {
            info!(
                threshold = %event.key,
                "Clock threshold exceeded. Service time: {}, UTC: {}, local: {}",
                event.service_local.format(TIME_FORMAT),
                event.utc.format(TIME_FORMAT),
                event.local().format(TIME_FORMAT)
            );
            let _ = self.events.send(ClockEvent::ThresholdExceeded(event));
        }

        generation
    }

    async fn finish_cycle(&self, generation: u64) {
        let state = self.state.lock().await;
        if state.generation != generation || !state.all_flagged() {
            debug!("cycle restarted during settle delay");
            return;
        }
        drop(state);

        info!("all thresholds reached");
        let _ = self.events.send(ClockEvent::AllThresholdsReached);
    }
}
