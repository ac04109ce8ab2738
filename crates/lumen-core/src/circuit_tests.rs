// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::*;

#[tokio::test]
async fn opens_after_threshold_consecutive_failures() {
    let breaker = CircuitBreaker::new(CircuitConfig {
        failure_threshold: 3,
        open_duration: Duration::from_secs(60),
        success_threshold: 1,
    });

    for _ in 0..3 {
        let result: Result<()> = breaker.call(|| async { Err(Error::Timeout) }).await;
        assert!(result.is_err());
    }

    assert!(breaker.is_open());
    let result: Result<()> = breaker.call(|| async { Ok(()) }).await;
    assert_eq!(result, Err(Error::CircuitOpen));
}

#[tokio::test]
async fn success_resets_failure_count_while_closed() {
    let breaker = CircuitBreaker::new(CircuitConfig {
        failure_threshold: 2,
        open_duration: Duration::from_secs(60),
        success_threshold: 1,
    });

    let _: Result<()> = breaker.call(|| async { Err(Error::Timeout) }).await;
    let _: Result<()> = breaker.call(|| async { Ok(()) }).await;
    let _: Result<()> = breaker.call(|| async { Err(Error::Timeout) }).await;
    assert!(!breaker.is_open());
}

#[tokio::test]
async fn half_open_after_open_duration_elapses() {
    let breaker = CircuitBreaker::new(CircuitConfig {
        failure_threshold: 1,
        open_duration: Duration::from_millis(10),
        success_threshold: 1,
    });
    let _: Result<()> = breaker.call(|| async { Err(Error::Timeout) }).await;
    assert!(breaker.is_open());

    tokio::time::sleep(Duration::from_millis(20)).await;
    // The probe call should be allowed through (not short-circuited) and,
    // on success, close the breaker.
    let result: Result<()> = breaker.call(|| async { Ok(()) }).await;
    assert!(result.is_ok());
    assert!(!breaker.is_open());
}

#[tokio::test]
async fn half_open_failure_reopens_immediately() {
    let breaker = CircuitBreaker::new(CircuitConfig {
        failure_threshold: 1,
        open_duration: Duration::from_millis(10),
        success_threshold: 1,
    });
    let _: Result<()> = breaker.call(|| async { Err(Error::Timeout) }).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let _: Result<()> = breaker.call(|| async { Err(Error::Timeout) }).await;
    assert!(breaker.is_open());
}

#[tokio::test]
async fn retry_succeeds_within_attempt_budget() {
    let policy = RetryPolicy { base: Duration::from_millis(1), max: Duration::from_millis(5), max_attempts: 5 };
    let cancel = CancellationToken::new();
    let attempts = AtomicU32::new(0);

    let result = policy
        .run(&cancel, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move { if n < 2 { Err(Error::Timeout) } else { Ok::<_, Error>(42) } }
        })
        .await;

    assert_eq!(result, Ok(42));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retry_exhausts_attempts_and_returns_last_error() {
    let policy = RetryPolicy { base: Duration::from_millis(1), max: Duration::from_millis(5), max_attempts: 2 };
    let cancel = CancellationToken::new();

    let result: Result<()> = policy.run(&cancel, || async { Err(Error::Timeout) }).await;
    assert_eq!(result, Err(Error::Timeout));
}

#[tokio::test]
async fn transition_callback_observes_close_to_open() {
    let seen: Arc<Mutex<Vec<(CircuitState, CircuitState)>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = seen.clone();
    let breaker = CircuitBreaker::new(CircuitConfig {
        failure_threshold: 1,
        open_duration: Duration::from_secs(60),
        success_threshold: 1,
    })
    .with_transition_callback(move |from, to| recorded.lock().unwrap().push((from, to)));

    let _: Result<()> = breaker.call(|| async { Err(Error::Timeout) }).await;

    let log = seen.lock().unwrap();
    assert_eq!(log.as_slice(), &[(CircuitState::Closed, CircuitState::Open)]);
}

#[tokio::test]
async fn run_if_stops_retrying_on_rejected_error() {
    let policy = RetryPolicy { base: Duration::from_millis(1), max: Duration::from_millis(5), max_attempts: 5 };
    let cancel = CancellationToken::new();
    let attempts = AtomicU32::new(0);

    let result: Result<()> = policy
        .run_if(
            &cancel,
            |err| !matches!(err, Error::CircuitOpen),
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::CircuitOpen) }
            },
        )
        .await;

    assert_eq!(result, Err(Error::CircuitOpen));
    assert_eq!(attempts.load(Ordering::SeqCst), 1, "should not retry a rejected error");
}

#[tokio::test]
async fn retry_stops_immediately_on_cancellation() {
    let policy = RetryPolicy::default();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result: Result<()> = policy.run(&cancel, || async { Err(Error::Timeout) }).await;
    assert_eq!(result, Err(Error::Closed));
}
