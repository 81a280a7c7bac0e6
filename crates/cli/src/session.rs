//! One monitoring session: pre-check, threshold dispatch and attempt cycles.

use std::sync::Arc;
use std::time::Duration;

use hosunlock_clock::{ClockEvent, ThresholdClock, ThresholdExceeded, TimeTriple};
use hosunlock_mi_api::RequestService;
use hosunlock_orchestrator::{PreCheckVerdict, RequestOrchestrator, pre_check_verdict};
use hosunlock_time_source::TimeSource;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Error;

/// How often the current times are logged while monitoring.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(30);

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Why monitoring ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The shared cancellation token fired.
    Cancelled,

    /// Every attempt cycle was used up.
    MaxRetries,

    /// An outcome made further attempts pointless.
    Terminal,
}

pub struct Session<T: TimeSource, S: RequestService> {
    cancellation: CancellationToken,
    clock: ThresholdClock<T>,
    events: broadcast::Receiver<ClockEvent>,
    orchestrator: Arc<RequestOrchestrator<S>>,
    report_interval: Duration,
}

impl<T: TimeSource, S: RequestService> Session<T, S> {
    pub fn new(
        clock: ThresholdClock<T>,
        orchestrator: RequestOrchestrator<S>,
        cancellation: CancellationToken,
    ) -> Self {
        let events = clock.subscribe();

        Self {
            cancellation,
            clock,
            events,
            orchestrator: Arc::new(orchestrator),
            report_interval: DEFAULT_REPORT_INTERVAL,
        }
    }

    #[cfg(test)]
    pub const fn orchestrator(&self) -> &Arc<RequestOrchestrator<S>> {
        &self.orchestrator
    }

    /// Starts the clock and runs the pre-flight status checks.
    pub async fn prepare(&mut self) -> Result<PreCheckVerdict, Error> {
        self.clock.initialize().await?;
        info!("Clock initialized.");

        let results = self.orchestrator.start().await?;
        info!("Request orchestrator started.");

        let verdict = pre_check_verdict(&results)?;
        match &verdict {
            PreCheckVerdict::Proceed => self.log_threshold_snapshots().await,
            PreCheckVerdict::AlreadyDecided { token, result } => {
                info!(token, "Token #{token} is already {result}; its thresholds will not be monitored.");
            }
            PreCheckVerdict::NeedsManualCheck { token } => {
                warn!(token, "Pre-run verification returned UNKNOWN status. Please verify the account status manually.");
            }
        }

        Ok(verdict)
    }

    /// Forwards clock events to the orchestrator until a stop condition.
    pub async fn monitor(&mut self) -> Result<SessionEnd, Error> {
        info!("Monitoring clock thresholds...");

        let mut report = tokio::time::interval(self.report_interval);
        report.set_missed_tick_behavior(MissedTickBehavior::Skip);
        report.tick().await;

        loop {
            tokio::select! {
                biased;

                () = self.cancellation.cancelled() => {
                    info!("Operation cancelled by user.");
                    return Ok(SessionEnd::Cancelled);
                }
                event = self.events.recv() => match event {
                    Ok(ClockEvent::ThresholdExceeded(exceeded)) => self.dispatch(exceeded),
                    Ok(ClockEvent::AllThresholdsReached) => {
                        if let Some(end) = self.finish_cycle().await? {
                            return Ok(end);
                        }
                    }
                    Ok(ClockEvent::MaxRetriesReached) => {
                        warn!("Maximum retry attempts reached.");
                        return Ok(SessionEnd::MaxRetries);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "missed clock events");
                    }
                    Err(RecvError::Closed) => return Ok(SessionEnd::Cancelled),
                },
                _ = report.tick() => self.log_current_times().await,
            }
        }
    }

    /// Cancels outstanding requests and stops the clock.
    pub async fn close(&self) {
        self.orchestrator.stop();
        self.clock.shutdown().await;
    }

    fn dispatch(&self, exceeded: ThresholdExceeded) {
        info!(
            token = exceeded.key.token_index,
            shift = exceeded.key.shift_index,
            "[THRESHOLD] {} exceeded! Beijing: {} | UTC: {} | Local: {}",
            exceeded.key,
            exceeded.service_local.format(TIME_FORMAT),
            exceeded.utc.format(TIME_FORMAT),
            exceeded.local().format(TIME_FORMAT),
        );

        drop(self.orchestrator.dispatch(exceeded.key));
    }

    async fn finish_cycle(&self) -> Result<Option<SessionEnd>, Error> {
        info!("[COMPLETE] All clock thresholds have been reached!");
        info!("Waiting for final processing...");

        self.orchestrator.mark_all_thresholds_reached();
        tokio::select! {
            biased;

            () = self.cancellation.cancelled() => return Ok(Some(SessionEnd::Cancelled)),
            () = self.orchestrator.wait_for_completion() => {}
        }

        let summary = self.orchestrator.summary();
        for (key, outcome) in summary.iter() {
            info!(token = key.token_index, shift = key.shift_index, "{key}: {outcome}");
        }

        if !summary.should_retry() {
            info!("Application process was done, please check the status details and proceed according to instructions.");
            return Ok(Some(SessionEnd::Terminal));
        }

        self.orchestrator.begin_cycle();
        if !self.clock.reset_and_restart().await? {
            return Ok(Some(SessionEnd::MaxRetries));
        }

        info!(
            attempt = self.clock.attempt_count(),
            remaining = self.clock.remaining_attempts(),
            "No request went through, retrying at the next window."
        );
        self.log_threshold_snapshots().await;

        Ok(None)
    }

    async fn log_threshold_snapshots(&self) {
        info!("Threshold times:");
        for (key, times) in self.clock.threshold_snapshots().await {
            info!("  {key}: {}", format_times(&times));
        }
    }

    async fn log_current_times(&self) {
        match self.clock.current_times().await {
            Ok(times) => info!(
                in_flight = self.orchestrator.in_flight(),
                "{}",
                format_times(&times)
            ),
            Err(e) => debug!("current times unavailable: {e}"),
        }
    }
}

fn format_times(times: &TimeTriple) -> String {
    format!(
        "Beijing: {} | UTC: {} | Local: {}",
        times.service_local.format(TIME_FORMAT),
        times.utc.format(TIME_FORMAT),
        times.local.format(TIME_FORMAT),
    )
}
