// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hook bus: named extension points that third-party code can attach
//! behavior to (before/after render, on terminate, on join) without the
//! runtime core depending on them. Synchronous hooks run inline, in priority
//! order; async hooks are dispatched onto a bounded worker pool so a slow
//! subscriber can't stall a render tick.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{RwLock, Semaphore};
use tracing::warn;

/// Names of the points a component's lifecycle exposes to hooks.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    BeforeMount,
    AfterMount,
    BeforeRender,
    AfterRender,
    BeforeEvent,
    AfterEvent,
    Connect,
    Disconnect,
    Reconnect,
    Send,
    Receive,
    Error,
    Panic,
}

type SyncHook = Arc<dyn Fn() + Send + Sync>;
type AsyncHook = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct Registered<H> {
    priority: i32,
    hook: H,
}

#[derive(Default)]
struct PointHooks {
    sync: Vec<Registered<SyncHook>>,
    r#async: Vec<Registered<AsyncHook>>,
}

/// The extension bus itself. Cloning is cheap (shared state via `Arc`), so a
/// single instance can be handed to every session.
pub struct HookBus {
    points: RwLock<HashMap<HookPoint, PointHooks>>,
    worker_permits: Arc<Semaphore>,
}

impl HookBus {
    /// `max_concurrent_async` bounds how many async hook invocations may run
    /// at once across the whole bus.
    pub fn new(max_concurrent_async: usize) -> Self {
        Self {
            points: RwLock::new(HashMap::new()),
            worker_permits: Arc::new(Semaphore::new(max_concurrent_async)),
        }
    }

    /// Register a synchronous hook at `point`. Higher `priority` runs first;
    /// ties run in registration order.
    pub async fn on(&self, point: HookPoint, priority: i32, hook: impl Fn() + Send + Sync + 'static) {
        let mut points = self.points.write().await;
        let entry = points.entry(point).or_default();
        entry.sync.push(Registered { priority, hook: Arc::new(hook) });
        entry.sync.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Register an async hook at `point`, run on the bounded worker pool
    /// rather than inline.
    pub async fn on_async<F, Fut>(&self, point: HookPoint, priority: i32, hook: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut points = self.points.write().await;
        let entry = points.entry(point).or_default();
        let boxed: AsyncHook = Arc::new(move || Box::pin(hook()));
        entry.r#async.push(Registered { priority, hook: boxed });
        entry.r#async.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Fire every hook registered at `point`. Sync hooks run inline, in
    /// priority order, each wrapped so a panicking hook can't take the
    /// session runtime down with it. Async hooks are spawned onto the
    /// bounded pool and not waited on.
    pub async fn fire(&self, point: HookPoint) {
        let points = self.points.read().await;
        let Some(hooks) = points.get(&point) else { return };

        for registered in &hooks.sync {
            let hook = registered.hook.clone();
            if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hook())) {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_owned());
                warn!(?point, message, "hook panicked");
            }
        }

        for registered in &hooks.r#async {
            let hook = registered.hook.clone();
            let permits = self.worker_permits.clone();
            tokio::spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else { return };
                hook().await;
            });
        }
    }
}

impl std::fmt::Debug for HookPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::BeforeMount => "before_mount",
            Self::AfterMount => "after_mount",
            Self::BeforeRender => "before_render",
            Self::AfterRender => "after_render",
            Self::BeforeEvent => "before_event",
            Self::AfterEvent => "after_event",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Reconnect => "reconnect",
            Self::Send => "send",
            Self::Receive => "receive",
            Self::Error => "error",
            Self::Panic => "panic",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
#[path = "hooks_tests.rs"]
mod tests;
