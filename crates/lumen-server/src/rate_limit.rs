// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A per-topic fixed-window rate limiter, implemented as a
//! [`crate::dispatcher::Middleware`] so it sits in front of every envelope
//! the connection gate dispatches, the way `rate_limit_per_second` is
//! described in the configuration surface. Grounded in the same
//! atomics-over-a-shared-map shape as `pubsub::PubSubInner` rather than a
//! token-bucket crate, since a fixed one-second window is all the spec
//! calls for.

// The bucket map's critical section never panics, so poisoning can't
// happen in practice; `expect` documents that rather than threading a
// fallback path.
#![allow(clippy::expect_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use lumen_core::Envelope;

use crate::dispatcher::{HandlerFuture, Middleware, Next};
use crate::error::ServerError;
use crate::session::epoch_ms;

struct Bucket {
    window_start_secs: AtomicU64,
    count: AtomicU32,
}

/// Limits how many envelopes per second a single topic (one connection's
/// joined channel) may push through the dispatcher. `0` disables the limit
/// entirely, matching the config flag's "0 disables" convention.
pub struct RateLimitMiddleware {
    per_second: u32,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimitMiddleware {
    pub fn new(per_second: u32) -> Self {
        Self { per_second, buckets: Mutex::new(HashMap::new()) }
    }

    fn allow(&self, topic: &str) -> bool {
        if self.per_second == 0 {
            return true;
        }
        let now_secs = epoch_ms() / 1000;
        let mut buckets = self.buckets.lock().expect("rate limit mutex poisoned");
        let bucket = buckets.entry(topic.to_owned()).or_insert_with(|| Bucket {
            window_start_secs: AtomicU64::new(now_secs),
            count: AtomicU32::new(0),
        });

        if bucket.window_start_secs.swap(now_secs, Ordering::AcqRel) != now_secs {
            bucket.count.store(0, Ordering::Release);
        }
        bucket.count.fetch_add(1, Ordering::AcqRel) < self.per_second
    }
}

impl Middleware for RateLimitMiddleware {
    fn call<'a>(&'a self, envelope: Envelope, next: Next<'a>) -> HandlerFuture<'a> {
        if self.allow(&envelope.topic) {
            next(envelope)
        } else {
            Box::pin(async move { Err(ServerError::Full) })
        }
    }
}
