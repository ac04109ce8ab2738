// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatcher: routes a decoded envelope through a middleware chain to a
//! final handler, with a per-invocation timeout and panic recovery.
//! Middleware chaining mirrors `middleware::from_fn_with_state` composition
//! in the teacher's `transport::build_router`, generalized from the
//! teacher's single auth middleware into an ordered `Vec`.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lumen_core::Envelope;

use crate::error::ServerError;

/// Per-dispatcher counters, matching the teacher's `AtomicU32`
/// health-failure-counter style but widened to `u64` and exposed as a
/// struct so a status endpoint can snapshot them.
#[derive(Debug, Default)]
pub struct DispatcherMetrics {
    pub received: AtomicU64,
    pub processed: AtomicU64,
    pub errored: AtomicU64,
    pub total_latency_micros: AtomicU64,
}

impl DispatcherMetrics {
    pub fn snapshot(&self) -> DispatcherMetricsSnapshot {
        DispatcherMetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
            total_latency_micros: self.total_latency_micros.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatcherMetricsSnapshot {
    pub received: u64,
    pub processed: u64,
    pub errored: u64,
    pub total_latency_micros: u64,
}

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<Envelope, ServerError>> + Send + 'a>>;
pub type Next<'a> = Box<dyn FnOnce(Envelope) -> HandlerFuture<'a> + Send + 'a>;

/// One link in the middleware chain. `call` receives the envelope and a
/// `next` continuation it may invoke zero or more times (zero to
/// short-circuit, once to pass through, never more than once in practice).
pub trait Middleware: Send + Sync {
    fn call<'a>(&'a self, envelope: Envelope, next: Next<'a>) -> HandlerFuture<'a>;
}

/// Routes events within a topic to a registered handler by event name.
pub type EventHandler =
    Box<dyn Fn(Envelope) -> HandlerFuture<'static> + Send + Sync>;

/// The message dispatcher: a middleware chain (applied in reverse
/// registration order, so the first-registered middleware is outermost)
/// wrapped around event-name routing, with a timeout and panic recovery
/// around the innermost call.
pub struct Dispatcher {
    middleware: Vec<Box<dyn Middleware>>,
    handlers: std::collections::HashMap<String, EventHandler>,
    default: Option<EventHandler>,
    timeout: Duration,
    pub metrics: DispatcherMetrics,
}

impl Dispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            middleware: Vec::new(),
            handlers: std::collections::HashMap::new(),
            default: None,
            timeout,
            metrics: DispatcherMetrics::default(),
        }
    }

    /// Register middleware; the most-recently-registered runs innermost
    /// (closest to the handler), matching "applied in reverse registration
    /// order".
    pub fn use_middleware(&mut self, middleware: impl Middleware + 'static) {
        self.middleware.push(Box::new(middleware));
    }

    pub fn on_event(
        &mut self,
        event: impl Into<String>,
        handler: impl Fn(Envelope) -> HandlerFuture<'static> + Send + Sync + 'static,
    ) {
        self.handlers.insert(event.into(), Box::new(handler));
    }

    /// Register a fallback invoked when no name-specific handler matches,
    /// instead of failing with `NoHandler`. Used at the connection gate to
    /// let every event name pass through once middleware has run, while
    /// still supporting name-specific handlers for callers that want them.
    pub fn on_default(&mut self, handler: impl Fn(Envelope) -> HandlerFuture<'static> + Send + Sync + 'static) {
        self.default = Some(Box::new(handler));
    }

    /// Dispatch one envelope: build the middleware chain around the
    /// event-routed handler, run it under the dispatcher's timeout, and
    /// recover from a handler panic into [`ServerError::HandlerPanic`].
    pub async fn dispatch(&self, envelope: Envelope) -> Result<Envelope, ServerError> {
        self.metrics.received.fetch_add(1, Ordering::Relaxed);
        let started = std::time::Instant::now();

        let result = tokio::time::timeout(self.timeout, self.run_chain(envelope))
            .await
            .unwrap_or(Err(ServerError::Timeout));

        self.metrics.total_latency_micros.fetch_add(
            started.elapsed().as_micros() as u64,
            Ordering::Relaxed,
        );
        match &result {
            Ok(_) => {
                self.metrics.processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.metrics.errored.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    fn run_chain<'a>(&'a self, envelope: Envelope) -> HandlerFuture<'a> {
        build_chain(&self.middleware, 0, envelope, final_handler(&self.handlers, self.default.as_deref()))
    }
}

fn build_chain<'a>(
    middleware: &'a [Box<dyn Middleware>],
    index: usize,
    envelope: Envelope,
    tail: Next<'a>,
) -> HandlerFuture<'a> {
    match middleware.get(index) {
        Some(layer) => {
            let next: Next<'a> = Box::new(move |e| build_chain(middleware, index + 1, e, tail));
            layer.call(envelope, next)
        }
        None => tail(envelope),
    }
}

fn final_handler<'a>(
    handlers: &'a std::collections::HashMap<String, EventHandler>,
    default: Option<&'a (dyn Fn(Envelope) -> HandlerFuture<'static> + Send + Sync)>,
) -> Next<'a> {
    Box::new(move |envelope| {
        Box::pin(async move {
            let handler = handlers.get(envelope.event.as_str()).map(|h| h.as_ref()).or(default);
            match handler {
                Some(handler) => {
                    let fut = std::panic::AssertUnwindSafe(handler(envelope));
                    match futures_util::FutureExt::catch_unwind(fut).await {
                        Ok(result) => result,
                        Err(_) => Err(ServerError::HandlerPanic),
                    }
                }
                None => Err(ServerError::NoHandler),
            }
        })
    })
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
