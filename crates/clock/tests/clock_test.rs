use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use hosunlock_clock::{ClockConfig, ClockEvent, Error, ThresholdClock, ThresholdExceeded};
use hosunlock_config::ThresholdKey;
use hosunlock_retry::RetryPolicy;
use hosunlock_time_source::MockTimeSource;
use pretty_assertions::assert_eq;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn keys(tokens: u32, shifts: &[i32]) -> Vec<ThresholdKey> {
    (1..=tokens)
        .flat_map(|token| {
            shifts.iter().zip(1u32..).map(move |(shift, position)| {
                ThresholdKey::new(token, format!("secret-{token}"), position, *shift)
            })
        })
        .collect()
}

fn build(
    now: &str,
    keys: Vec<ThresholdKey>,
    max_attempts: u32,
) -> (ThresholdClock<MockTimeSource>, Arc<MockTimeSource>) {
    let source = Arc::new(MockTimeSource::new(utc(now)));
    let config = ClockConfig {
        max_attempts,
        retry: RetryPolicy::new(2, Duration::from_millis(10), false),
        ..ClockConfig::default()
    };

    (ThresholdClock::new(config, Arc::clone(&source), keys), source)
}

fn anchor_target(shift_ms: i32) -> DateTime<Utc> {
    utc("2024-01-15T16:00:00Z") - TimeDelta::milliseconds(i64::from(shift_ms))
}

async fn next_exceeded(rx: &mut broadcast::Receiver<ClockEvent>) -> ThresholdExceeded {
    match rx.recv().await.unwrap() {
        ClockEvent::ThresholdExceeded(event) => event,
        other => panic!("expected ThresholdExceeded, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_single_threshold_fires_once_then_all_reached() {
    let (clock, _source) = build("2024-01-15T15:59:59.500Z", keys(1, &[0]), 5);
    let mut rx = clock.subscribe();
    let start = Instant::now();

    clock.initialize().await.unwrap();

    let event = next_exceeded(&mut rx).await;
    assert_eq!(event.key, ThresholdKey::new(1, "secret-1", 1, 0));
    assert_eq!(event.utc, utc("2024-01-15T16:00:00Z"));
    assert_eq!(event.service_local.to_rfc3339(), "2024-01-16T00:00:00+08:00");
    assert_eq!(start.elapsed(), Duration::from_millis(500));

    assert_eq!(rx.recv().await.unwrap(), ClockEvent::AllThresholdsReached);
    assert_eq!(start.elapsed(), Duration::from_millis(1500));
    assert!(clock.were_all_thresholds_reached().await);
    assert!(!clock.is_running());

    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

    clock.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shifts_fire_in_target_order() {
    let (clock, _source) = build("2024-01-15T15:59:59Z", keys(1, &[0, 300, -200]), 5);
    let mut rx = clock.subscribe();

    clock.initialize().await.unwrap();

    let mut fired = Vec::new();
    for _ in 0..3 {
        let event = next_exceeded(&mut rx).await;
        assert!(event.utc >= anchor_target(event.key.shift_ms));
        fired.push(event.key.shift_ms);
    }

    assert_eq!(fired, vec![300, 0, -200]);
    assert_eq!(rx.recv().await.unwrap(), ClockEvent::AllThresholdsReached);

    clock.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_not_all_reached_while_thresholds_pending() {
    let (clock, _source) = build("2024-01-15T15:59:59.800Z", keys(1, &[0, -500]), 5);
    let mut rx = clock.subscribe();

    clock.initialize().await.unwrap();
    assert!(!clock.were_all_thresholds_reached().await);

    let first = next_exceeded(&mut rx).await;
    assert_eq!(first.key.shift_ms, 0);
    assert!(!clock.were_all_thresholds_reached().await);

    let second = next_exceeded(&mut rx).await;
    assert_eq!(second.key.shift_ms, -500);
    assert!(clock.were_all_thresholds_reached().await);

    clock.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_snapshots_cover_cross_product() {
    let (clock, _source) = build("2024-01-15T10:00:00Z", keys(2, &[0, 100]), 5);
    clock.initialize().await.unwrap();

    let snapshots = clock.threshold_snapshots().await;

    assert_eq!(snapshots.len(), 4);
    for (key, snapshot) in &snapshots {
        let expected = anchor_target(key.shift_ms);
        assert_eq!(snapshot.utc, expected);
        assert_eq!(snapshot.service_local.with_timezone(&Utc), expected);
        assert_eq!(snapshot.local.with_timezone(&Utc), expected);
    }

    clock.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reset_is_bounded_by_max_attempts() {
    let (clock, _source) = build("2024-01-15T03:00:00Z", keys(1, &[0]), 5);
    let mut rx = clock.subscribe();
    clock.initialize().await.unwrap();

    for attempt in 1..=4 {
        assert!(clock.reset_and_restart().await.unwrap());
        assert_eq!(clock.attempt_count(), attempt);
        assert!(clock.can_retry());
    }

    assert!(!clock.reset_and_restart().await.unwrap());
    assert!(!clock.can_retry());
    assert_eq!(clock.remaining_attempts(), 0);
    assert_eq!(clock.attempt_count(), 5);
    assert!(!clock.is_running());
    assert_eq!(rx.try_recv(), Ok(ClockEvent::MaxRetriesReached));

    assert!(!clock.reset_and_restart().await.unwrap());
    assert_eq!(clock.attempt_count(), 5);

    clock.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reset_recomputes_targets_for_next_cycle() {
    let (clock, source) = build("2024-01-15T15:59:59.500Z", keys(1, &[0]), 5);
    let mut rx = clock.subscribe();
    clock.initialize().await.unwrap();

    next_exceeded(&mut rx).await;
    assert_eq!(rx.recv().await.unwrap(), ClockEvent::AllThresholdsReached);

    source.set_now(utc("2024-01-16T15:59:59.800Z"));
    assert!(clock.reset_and_restart().await.unwrap());
    assert_eq!(clock.remaining_attempts(), 4);
    assert!(!clock.were_all_thresholds_reached().await);

    let snapshot = clock.threshold_snapshots().await;
    let target = snapshot.values().next().unwrap();
    assert_eq!(target.utc, utc("2024-01-16T16:00:00Z"));

    let event = next_exceeded(&mut rx).await;
    assert_eq!(event.utc, utc("2024-01-16T16:00:00Z"));
    assert_eq!(rx.recv().await.unwrap(), ClockEvent::AllThresholdsReached);

    clock.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reset_during_settle_suppresses_all_reached() {
    let (clock, source) = build("2024-01-15T15:59:59.500Z", keys(1, &[0]), 5);
    let mut rx = clock.subscribe();
    clock.initialize().await.unwrap();

    next_exceeded(&mut rx).await;
    source.set_now(utc("2024-01-16T15:59:00Z"));
    assert!(clock.reset_and_restart().await.unwrap());

    let event = next_exceeded(&mut rx).await;
    assert!(event.utc >= utc("2024-01-16T16:00:00Z"));
    assert!(event.utc < utc("2024-01-16T16:00:00.100Z"));
    assert_eq!(rx.recv().await.unwrap(), ClockEvent::AllThresholdsReached);

    clock.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_holds_thresholds_and_resume_catches_up() {
    let (clock, _source) = build("2024-01-15T15:59:59Z", keys(1, &[0]), 5);
    let mut rx = clock.subscribe();
    clock.initialize().await.unwrap();
    clock.stop();

    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    assert!(!clock.were_all_thresholds_reached().await);

    clock.resume();
    let event = next_exceeded(&mut rx).await;

    assert_eq!(event.utc, utc("2024-01-15T16:00:04Z"));

    clock.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_initialize_is_idempotent() {
    let (clock, source) = build("2024-01-15T03:00:00Z", keys(1, &[0]), 5);

    clock.initialize().await.unwrap();
    clock.initialize().await.unwrap();

    assert_eq!(source.query_count(), 1);

    clock.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_initialize_retries_transient_time_failures() {
    let (clock, source) = build("2024-01-15T03:00:00Z", keys(1, &[0]), 5);
    source.fail_next(2);

    clock.initialize().await.unwrap();

    assert_eq!(source.query_count(), 3);

    clock.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_initialize_fails_when_time_source_exhausted() {
    let (clock, source) = build("2024-01-15T03:00:00Z", keys(1, &[0]), 5);
    source.fail_next(3);

    let err = clock.initialize().await.unwrap_err();

    assert!(matches!(err, Error::TimeSource(_)));
    assert_eq!(source.query_count(), 3);
    assert!(matches!(clock.current_times().await, Err(Error::NotInitialized)));
}

#[tokio::test(start_paused = true)]
async fn test_reset_requires_initialize() {
    let (clock, _source) = build("2024-01-15T03:00:00Z", keys(1, &[0]), 5);

    assert!(matches!(
        clock.reset_and_restart().await,
        Err(Error::NotInitialized)
    ));
    assert_eq!(clock.attempt_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_current_times_follow_elapsed_time() {
    let (clock, _source) = build("2024-01-15T03:00:00Z", keys(1, &[0]), 5);
    clock.initialize().await.unwrap();

    tokio::time::advance(Duration::from_millis(2500)).await;
    let times = clock.current_times().await.unwrap();

    assert_eq!(times.utc, utc("2024-01-15T03:00:02.500Z"));
    assert_eq!(times.service_local.to_rfc3339(), "2024-01-15T11:00:02.500+08:00");

    clock.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_initialize_after_shutdown_fails() {
    let (clock, _source) = build("2024-01-15T03:00:00Z", keys(1, &[0]), 5);
    clock.shutdown().await;

    assert!(matches!(clock.initialize().await, Err(Error::ShutDown)));
}

#[tokio::test(start_paused = true)]
async fn test_session_cancel_aborts_failing_initialize() {
    let source = Arc::new(MockTimeSource::new(utc("2024-01-15T03:00:00Z")));
    source.fail_next(100);
    let config = ClockConfig {
        retry: RetryPolicy::new(5, Duration::from_secs(10), false),
        ..ClockConfig::default()
    };
    let cancellation = CancellationToken::new();
    let clock = ThresholdClock::with_cancellation(
        config,
        Arc::clone(&source),
        keys(1, &[0]),
        cancellation.clone(),
    );

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(15)).await;
        cancellation.cancel();
    });

    let start = Instant::now();
    let err = clock.initialize().await.unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(start.elapsed() >= Duration::from_secs(15));
    assert!(start.elapsed() < Duration::from_secs(20));
    assert_eq!(source.query_count(), 2);
    assert!(matches!(clock.initialize().await, Err(Error::Cancelled)));

    canceller.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_session_cancel_before_initialize() {
    let source = Arc::new(MockTimeSource::new(utc("2024-01-15T03:00:00Z")));
    let cancellation = CancellationToken::new();
    cancellation.cancel();
    let clock = ThresholdClock::with_cancellation(
        ClockConfig::default(),
        Arc::clone(&source),
        keys(1, &[0]),
        cancellation,
    );

    assert!(matches!(clock.initialize().await, Err(Error::Cancelled)));
    assert_eq!(source.query_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_event_channel_holds_a_full_cycle() {
    let shifts: Vec<i32> = (1..=600).collect();
    let (clock, _source) = build("2024-01-15T15:59:59Z", keys(1, &shifts), 5);
    let mut rx = clock.subscribe();

    clock.initialize().await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    let mut exceeded = 0;
    loop {
        match rx.try_recv() {
            Ok(ClockEvent::ThresholdExceeded(_)) => exceeded += 1,
            Ok(ClockEvent::AllThresholdsReached) => break,
            other => panic!("unexpected event {other:?}"),
        }
    }

    assert_eq!(exceeded, 600);

    clock.shutdown().await;
}
