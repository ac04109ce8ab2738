// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Circuit breaker and retry: protects a session runtime from a handler or
//! upstream dependency that is failing repeatedly, and provides the
//! exponential-backoff reconnect loop used by transports and pub/sub
//! publishers.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

/// Public mirror of the breaker's internal state, passed to transition
/// callbacks so observers don't need to know the atomic encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

fn to_public_state(raw: u8) -> CircuitState {
    match raw {
        STATE_OPEN => CircuitState::Open,
        STATE_HALF_OPEN => CircuitState::HalfOpen,
        _ => CircuitState::Closed,
    }
}

/// Tuning knobs for [`CircuitBreaker`].
#[derive(Debug, Clone, Copy)]
pub struct CircuitConfig {
    /// Consecutive failures before tripping from closed to open.
    pub failure_threshold: u32,
    /// How long the breaker stays open before allowing a half-open probe.
    pub open_duration: Duration,
    /// Consecutive half-open successes required to close again.
    pub success_threshold: u32,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// A closed/open/half-open circuit breaker guarding calls to an unreliable
/// dependency (a handler invocation, an upstream fetch). Single-instance
/// atomics keep `call` lock-free and safe to share across tasks via `Arc`.
pub struct CircuitBreaker {
    config: CircuitConfig,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    opened_at_ms: AtomicU64,
    on_transition: Option<Arc<dyn Fn(CircuitState, CircuitState) + Send + Sync>>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("consecutive_failures", &self.consecutive_failures)
            .field("consecutive_successes", &self.consecutive_successes)
            .field("opened_at_ms", &self.opened_at_ms)
            .field("on_transition", &self.on_transition.is_some())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            config,
            state: AtomicU8::new(STATE_CLOSED),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            opened_at_ms: AtomicU64::new(0),
            on_transition: None,
        }
    }

    /// Install a callback fired on every state transition, as `spec.md`
    /// §4.I calls for ("state transitions fire a user callback"). Runs
    /// synchronously on whichever task observes the transition.
    pub fn with_transition_callback(
        mut self,
        callback: impl Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    ) -> Self {
        self.on_transition = Some(Arc::new(callback));
        self
    }

    fn transition_to(&self, from: u8, to: u8) {
        self.state.store(to, Ordering::Release);
        if let Some(callback) = &self.on_transition {
            callback(to_public_state(from), to_public_state(to));
        }
    }

    pub fn is_open(&self) -> bool {
        self.effective_state() == STATE_OPEN
    }

    /// Resolve `Open` back to `HalfOpen` once `open_duration` has elapsed,
    /// without mutating state for callers that are just inspecting it.
    fn effective_state(&self) -> u8 {
        let state = self.state.load(Ordering::Acquire);
        if state != STATE_OPEN {
            return state;
        }
        let opened_at = self.opened_at_ms.load(Ordering::Acquire);
        if now_ms().saturating_sub(opened_at) >= self.config.open_duration.as_millis() as u64 {
            STATE_HALF_OPEN
        } else {
            STATE_OPEN
        }
    }

    /// Run `f` through the breaker: short-circuits with [`Error::CircuitOpen`]
    /// while open, otherwise runs `f` and records the outcome.
    pub async fn call<T, Fut>(&self, f: impl FnOnce() -> Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let state = self.effective_state();
        if state == STATE_OPEN {
            return Err(Error::CircuitOpen);
        }
        if state == STATE_HALF_OPEN {
            let prior = self.state.swap(STATE_HALF_OPEN, Ordering::AcqRel);
            if prior != STATE_HALF_OPEN {
                if let Some(callback) = &self.on_transition {
                    callback(to_public_state(prior), CircuitState::HalfOpen);
                }
            }
        }

        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        let state = self.state.load(Ordering::Acquire);
        if state == STATE_HALF_OPEN {
            let successes = self.consecutive_successes.fetch_add(1, Ordering::AcqRel) + 1;
            if successes >= self.config.success_threshold {
                self.close();
            }
        }
    }

    fn record_failure(&self) {
        self.consecutive_successes.store(0, Ordering::Release);
        let state = self.state.load(Ordering::Acquire);
        if state == STATE_HALF_OPEN {
            self.open();
            return;
        }
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= self.config.failure_threshold {
            self.open();
        }
    }

    fn open(&self) {
        let prior = self.state.load(Ordering::Acquire);
        self.transition_to(prior, STATE_OPEN);
        self.opened_at_ms.store(now_ms(), Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
    }

    fn close(&self) {
        let prior = self.state.load(Ordering::Acquire);
        self.transition_to(prior, STATE_CLOSED);
        self.consecutive_successes.store(0, Ordering::Release);
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Exponential-backoff retry, grounded in the upstream reconnect loop: start
/// at `base`, double on each failure, cap at `max`, add up to 20% jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { base: Duration::from_millis(100), max: Duration::from_secs(5), max_attempts: 8 }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.base.as_millis().saturating_mul(1u128 << attempt.min(20));
        let capped = scaled.min(self.max.as_millis());
        let jitter_frac: f64 = rand::rng().random_range(0.0..0.2);
        let jittered = (capped as f64 * (1.0 + jitter_frac)) as u64;
        Duration::from_millis(jittered)
    }

    /// Retry `f` until it succeeds, `max_attempts` is exhausted, or `cancel`
    /// fires. Returns the last error on exhaustion. Retries every error;
    /// use [`run_if`](Self::run_if) to retry only a subset.
    pub async fn run<T, Fut>(
        &self,
        cancel: &CancellationToken,
        f: impl FnMut() -> Fut,
    ) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        self.run_if(cancel, |_| true, f).await
    }

    /// As [`run`](Self::run), but `should_retry` decides whether a given
    /// error is worth another attempt; the first error it rejects is
    /// returned immediately without waiting out a backoff delay. Grounded in
    /// spec.md §4.I's "configurable predicate" requirement, e.g. to retry
    /// [`Error::Timeout`] but not [`Error::CircuitOpen`].
    pub async fn run_if<T, Fut>(
        &self,
        cancel: &CancellationToken,
        should_retry: impl Fn(&Error) -> bool,
        mut f: impl FnMut() -> Fut,
    ) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Closed),
                result = f() => {
                    match result {
                        Ok(value) => return Ok(value),
                        Err(err) => {
                            if !should_retry(&err) {
                                return Err(err);
                            }
                            attempt += 1;
                            if attempt >= self.max_attempts {
                                return Err(err);
                            }
                        }
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Closed),
                _ = tokio::time::sleep(self.delay_for(attempt - 1)) => {}
            }
        }
    }
}

#[cfg(test)]
#[path = "circuit_tests.rs"]
mod tests;
