// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A session owns one connection's lifetime: its component instance, its
//! per-socket diff state, and the transport handle it renders into.

pub mod manager;
pub mod runtime;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use lumen_core::diff::DiffEngineState;
use lumen_core::{CircuitBreaker, CircuitConfig};

use crate::component::Component;
use crate::transport::TransportHandle;

pub use manager::SessionManager;

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// One connection's full state: component instance, transport handle, and
/// the per-socket diff baseline. Exclusively owned by its message-loop task;
/// the Session Manager only weakly indexes it by id and socket-id.
pub struct Session {
    pub id: String,
    pub socket_id: String,
    pub topic: String,
    pub join_ref: Mutex<Option<String>>,
    pub mounted: AtomicBool,
    pub created_at_ms: u64,
    pub last_activity_ms: AtomicU64,
    pub cancel: CancellationToken,
    pub component: Mutex<Box<dyn Component>>,
    pub diff_state: Mutex<DiffEngineState>,
    pub transport: TransportHandle,
    /// Guards calls into this session's component `handle_event`/
    /// `handle_info`, per spec.md §4.I ("brittle external calls are wrapped
    /// by" the circuit breaker) generalized to "any handler... a session
    /// runtime calls" (see DESIGN.md). A component that fails repeatedly
    /// trips the breaker so further events fail fast with `CircuitOpen`
    /// instead of waiting out the full per-event timeout every time.
    pub handler_circuit: CircuitBreaker,
    timeout_evicted: AtomicBool,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        socket_id: impl Into<String>,
        topic: impl Into<String>,
        component: Box<dyn Component>,
        transport: TransportHandle,
        parent_cancel: &CancellationToken,
    ) -> Arc<Self> {
        let now = epoch_ms();
        Arc::new(Self {
            id: id.into(),
            socket_id: socket_id.into(),
            topic: topic.into(),
            join_ref: Mutex::new(None),
            mounted: AtomicBool::new(false),
            created_at_ms: now,
            last_activity_ms: AtomicU64::new(now),
            cancel: parent_cancel.child_token(),
            component: Mutex::new(component),
            diff_state: Mutex::new(DiffEngineState::new()),
            transport,
            handler_circuit: CircuitBreaker::new(CircuitConfig::default()),
            timeout_evicted: AtomicBool::new(false),
        })
    }

    /// Mark this session as evicted by the TTL sweep rather than ordinary
    /// shutdown, so the message loop reports `TerminateReason::Timeout`
    /// instead of `Shutdown` once `cancel` fires. Must be called before
    /// `cancel.cancel()`.
    pub fn mark_timeout_evicted(&self) {
        self.timeout_evicted.store(true, Ordering::Relaxed);
    }

    pub fn is_timeout_evicted(&self) -> bool {
        self.timeout_evicted.load(Ordering::Relaxed)
    }

    pub fn touch(&self) {
        self.last_activity_ms.store(epoch_ms(), Ordering::Relaxed);
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms.load(Ordering::Relaxed)
    }

    pub fn idle_for_ms(&self) -> u64 {
        epoch_ms().saturating_sub(self.last_activity_ms())
    }
}
