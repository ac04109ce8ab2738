// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lumen_core::Envelope;
use serde_json::json;

use super::*;

fn envelope(event: &str) -> Envelope {
    let mut e = Envelope::new("room:1", event);
    e.payload = Some(json!({}));
    e
}

struct RecordingMiddleware {
    log: Arc<std::sync::Mutex<Vec<&'static str>>>,
    tag: &'static str,
}

impl Middleware for RecordingMiddleware {
    fn call<'a>(&'a self, envelope: Envelope, next: Next<'a>) -> HandlerFuture<'a> {
        self.log.lock().unwrap().push(self.tag);
        next(envelope)
    }
}

#[tokio::test]
async fn dispatches_to_registered_handler() {
    let mut d = Dispatcher::new(Duration::from_secs(1));
    d.on_event("inc", |e| Box::pin(async move { Ok(e) }));

    let result = d.dispatch(envelope("inc")).await.unwrap();
    assert_eq!(result.event, "inc");
    assert_eq!(d.metrics.snapshot().processed, 1);
}

#[tokio::test]
async fn unknown_event_fails_no_handler() {
    let d = Dispatcher::new(Duration::from_secs(1));
    let err = d.dispatch(envelope("ghost")).await.unwrap_err();
    assert_eq!(err, ServerError::NoHandler);
    assert_eq!(d.metrics.snapshot().errored, 1);
}

#[tokio::test]
async fn middleware_runs_in_reverse_registration_order() {
    let log = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut d = Dispatcher::new(Duration::from_secs(1));
    d.use_middleware(RecordingMiddleware { log: log.clone(), tag: "outer" });
    d.use_middleware(RecordingMiddleware { log: log.clone(), tag: "inner" });
    d.on_event("inc", |e| Box::pin(async move { Ok(e) }));

    d.dispatch(envelope("inc")).await.unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["outer", "inner"]);
}

#[tokio::test]
async fn handler_timeout_is_reported() {
    let mut d = Dispatcher::new(Duration::from_millis(20));
    d.on_event("slow", |e| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(e)
        })
    });

    let err = d.dispatch(envelope("slow")).await.unwrap_err();
    assert_eq!(err, ServerError::Timeout);
}

#[tokio::test]
#[allow(clippy::panic)]
async fn handler_panic_is_recovered_as_handler_panic() {
    let mut d = Dispatcher::new(Duration::from_secs(1));
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    d.on_event("boom", move |_e| {
        c.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { panic!("boom") })
    });

    let err = d.dispatch(envelope("boom")).await.unwrap_err();
    assert_eq!(err, ServerError::HandlerPanic);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Dispatcher remains usable after a handler panic.
    let err = d.dispatch(envelope("boom")).await.unwrap_err();
    assert_eq!(err, ServerError::HandlerPanic);
}

#[tokio::test]
async fn short_circuiting_middleware_never_reaches_handler() {
    let mut d = Dispatcher::new(Duration::from_secs(1));
    struct Blocker;
    impl Middleware for Blocker {
        fn call<'a>(&'a self, _envelope: Envelope, _next: Next<'a>) -> HandlerFuture<'a> {
            Box::pin(async move { Err(ServerError::Unauthorized) })
        }
    }
    d.use_middleware(Blocker);
    let reached = Arc::new(AtomicUsize::new(0));
    let r = reached.clone();
    d.on_event("inc", move |e| {
        r.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { Ok(e) })
    });

    let err = d.dispatch(envelope("inc")).await.unwrap_err();
    assert_eq!(err, ServerError::Unauthorized);
    assert_eq!(reached.load(Ordering::SeqCst), 0);
}
