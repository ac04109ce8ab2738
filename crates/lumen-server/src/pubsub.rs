// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process pub/sub: topic -> subscriptions, each owning a bounded,
//! once-closeable channel. Grounded in the teacher's `Aggregator`
//! (`state.rs`), generalized from a single broadcast channel to per-topic,
//! per-subscriber bounded channels with drop-on-full backpressure and a
//! panic-recovery boundary around each consumer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value as Json;
use tokio::sync::{mpsc, RwLock};
use tracing::warn;

use lumen_core::{Error, Result};

/// Identifies a single subscription within a topic.
pub type SubscriptionId = u64;

struct Subscription {
    id: SubscriptionId,
    tx: mpsc::Sender<Json>,
    closed: Arc<AtomicBool>,
}

/// A live handle to one subscription. Dropping it does not unsubscribe —
/// callers must call `unsubscribe` explicitly, matching the spec's
/// idempotent-unsubscribe contract.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    topic: String,
    closed: Arc<AtomicBool>,
    bus: Arc<PubSubInner>,
}

impl SubscriptionHandle {
    /// Idempotent: unsubscribing twice (or after the bus closed) is a no-op.
    pub async fn unsubscribe(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.bus.remove(&self.topic, self.id).await;
    }
}

struct PubSubInner {
    topics: RwLock<HashMap<String, Vec<Subscription>>>,
    closed: AtomicBool,
    next_id: AtomicU64,
    max_subscriptions_per_topic: usize,
}

impl PubSubInner {
    async fn remove(&self, topic: &str, id: SubscriptionId) {
        let mut topics = self.topics.write().await;
        if let Some(subs) = topics.get_mut(topic) {
            subs.retain(|s| s.id != id);
            if subs.is_empty() {
                topics.remove(topic);
            }
        }
    }
}

/// In-process pub/sub hub. `publish` never blocks on a slow subscriber:
/// a full channel just drops that subscriber's copy of the message.
#[derive(Clone)]
pub struct InProcessPubSub {
    inner: Arc<PubSubInner>,
}

impl InProcessPubSub {
    pub fn new(max_subscriptions_per_topic: usize) -> Self {
        Self {
            inner: Arc::new(PubSubInner {
                topics: RwLock::new(HashMap::new()),
                closed: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                max_subscriptions_per_topic,
            }),
        }
    }

    /// Subscribe to `topic`; `handler` runs on a dedicated consumer task,
    /// wrapped in a panic-recovery boundary so one misbehaving handler
    /// cannot take down the bus.
    pub async fn subscribe(
        &self,
        topic: impl Into<String>,
        queue_depth: usize,
        handler: impl Fn(Json) + Send + Sync + 'static,
    ) -> Result<SubscriptionHandle> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }

        let topic = topic.into();
        let (tx, mut rx) = mpsc::channel(queue_depth.max(1));
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let closed = Arc::new(AtomicBool::new(false));

        {
            let mut topics = self.inner.topics.write().await;
            let subs = topics.entry(topic.clone()).or_default();
            if subs.len() >= self.inner.max_subscriptions_per_topic {
                return Err(Error::Full);
            }
            subs.push(Subscription { id, tx, closed: closed.clone() });
        }

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(payload) =
                    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(msg)))
                {
                    let message = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic payload".to_owned());
                    warn!(message, "pub/sub handler panicked");
                }
            }
        });

        Ok(SubscriptionHandle { id, topic, closed, bus: self.inner.clone() })
    }

    /// Publish `message` to every current subscriber of `topic`. A no-op if
    /// the topic has no subscribers. Never blocks: a subscriber whose queue
    /// is full simply misses this message.
    pub async fn publish(&self, topic: &str, message: Json) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        let topics = self.inner.topics.read().await;
        let Some(subs) = topics.get(topic) else { return Ok(()) };
        for sub in subs {
            let _ = sub.tx.try_send(message.clone());
        }
        Ok(())
    }

    /// Drain and close every subscription under a once-guard, flipping the
    /// bus to a closed state so subsequent publish/subscribe calls fail
    /// fast.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut topics = self.inner.topics.write().await;
        for (_, subs) in topics.drain() {
            for sub in subs {
                sub.closed.store(true, Ordering::Release);
            }
        }
    }
}

#[cfg(test)]
#[path = "pubsub_tests.rs"]
mod tests;
