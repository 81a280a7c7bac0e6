//! Headless driver: loads the configuration, runs the pre-flight checks and
//! applies for unlock at every configured threshold.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod args;
mod error;
mod session;

use std::sync::Arc;

use clap::Parser;
use hosunlock_clock::{ClockConfig, ThresholdClock};
use hosunlock_config::AppConfig;
use hosunlock_mi_api::{ApiConfig, HttpServiceFactory};
use hosunlock_orchestrator::RequestOrchestrator;
use hosunlock_time_source::SntpTimeSource;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::args::Args;
use crate::error::Error;
use crate::session::{Session, SessionEnd};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let overrides = args.overrides();

    let mut config = AppConfig::load_or_default(overrides.config_path())?;
    config.apply_overrides(&overrides)?;
    if let Err(e) = config.validate() {
        error!("Application configuration is invalid: {e}");
        error!("Please check that {} is valid and present.", overrides.config_path().display());
        return Err(e.into());
    }

    info!("HOSUnlock - Headless Mode");
    info!("Press Ctrl+C to stop");
    info!("Configuration loaded successfully.");
    for (position, shift) in config.token_shifts.iter().enumerate() {
        info!("Token Shift #{}: {shift}ms", position + 1);
    }

    let shutdown_token = CancellationToken::new();
    spawn_signal_handler(shutdown_token.clone());

    if !config.auto_run_on_start
        && !confirm("Press Enter to begin monitoring or type anything else to exit:", &shutdown_token).await?
    {
        info!("Exiting application.");
        return Ok(());
    }

    let clock = ThresholdClock::with_cancellation(
        ClockConfig::from_app_config(&config),
        Arc::new(SntpTimeSource::default()),
        config.threshold_keys(),
        shutdown_token.clone(),
    );
    let factory = HttpServiceFactory::new(ApiConfig::new(config.retry_policy()));
    let orchestrator = RequestOrchestrator::new(&factory, &config.tokens, shutdown_token.clone())?;
    let mut session = Session::new(clock, orchestrator, shutdown_token.clone());

    let result = run(&mut session, config.auto_run_on_start, &shutdown_token).await;

    info!("Shutting down application...");
    session.close().await;
    info!("Application shutdown complete.");

    result
}

async fn run<T, S>(
    session: &mut Session<T, S>,
    auto_run: bool,
    shutdown_token: &CancellationToken,
) -> Result<(), Error>
where
    T: hosunlock_time_source::TimeSource,
    S: hosunlock_mi_api::RequestService,
{
    if !session.prepare().await?.can_proceed() {
        warn!("Application cannot proceed due to pre-run verification results. Check your account details and the logs above.");
        return Ok(());
    }

    if !auto_run
        && !confirm("Press Enter to continue monitoring the clock thresholds or type anything else to exit:", shutdown_token).await?
    {
        info!("Exiting application.");
        return Ok(());
    }

    match session.monitor().await? {
        SessionEnd::Cancelled => info!("Monitoring cancelled."),
        SessionEnd::MaxRetries => warn!("All attempt cycles were used without a final result."),
        SessionEnd::Terminal => info!("All thresholds reached! Application completed."),
    }

    Ok(())
}

/// Returns `true` when the operator pressed Enter on an empty line. End of
/// input counts as a refusal.
async fn confirm(prompt: &str, shutdown_token: &CancellationToken) -> Result<bool, Error> {
    info!("{prompt}");

    let mut line = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin());

    tokio::select! {
        () = shutdown_token.cancelled() => Ok(false),
        read = stdin.read_line(&mut line) => Ok(read? > 0 && line.trim().is_empty()),
    }
}

fn spawn_signal_handler(shutdown_token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(mut sigterm), Ok(mut sigint)) => {
                    tokio::select! {
                        _ = sigterm.recv() => info!("Received SIGTERM"),
                        _ = sigint.recv() => info!("Received SIGINT"),
                    }
                }
                _ => {
                    warn!("failed to install unix signal handlers, falling back to ctrl-c");
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Received interrupt signal");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received interrupt signal");
        }

        info!("Shutting down");
        shutdown_token.cancel();
    });
}
