// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::*;

#[tokio::test]
async fn sync_hooks_run_in_priority_order() {
    let bus = HookBus::new(4);
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    let o1 = order.clone();
    bus.on(HookPoint::BeforeRender, 1, move || o1.lock().unwrap().push(1)).await;
    let o2 = order.clone();
    bus.on(HookPoint::BeforeRender, 10, move || o2.lock().unwrap().push(10)).await;
    let o3 = order.clone();
    bus.on(HookPoint::BeforeRender, 5, move || o3.lock().unwrap().push(5)).await;

    bus.fire(HookPoint::BeforeRender).await;
    assert_eq!(*order.lock().unwrap(), vec![10, 5, 1]);
}

#[tokio::test]
async fn firing_unregistered_point_is_a_noop() {
    let bus = HookBus::new(4);
    bus.fire(HookPoint::Disconnect).await;
}

#[tokio::test]
#[allow(clippy::panic)]
async fn panicking_sync_hook_does_not_stop_later_hooks() {
    let bus = HookBus::new(4);
    let ran = Arc::new(AtomicUsize::new(0));

    bus.on(HookPoint::Connect, 10, || panic!("boom")).await;
    let r = ran.clone();
    bus.on(HookPoint::Connect, 1, move || {
        r.fetch_add(1, Ordering::SeqCst);
    })
    .await;

    bus.fire(HookPoint::Connect).await;
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn async_hooks_are_dispatched_to_worker_pool() {
    let bus = HookBus::new(4);
    let ran = Arc::new(AtomicUsize::new(0));
    let r = ran.clone();
    bus.on_async(HookPoint::AfterRender, 0, move || {
        let r = r.clone();
        async move {
            r.fetch_add(1, Ordering::SeqCst);
        }
    })
    .await;

    bus.fire(HookPoint::AfterRender).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}
