// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide session index: id -> session and socket-id -> session,
//! with a capacity bound and TTL-driven eviction sweep, grounded in the
//! teacher's `spawn_health_checker` (`upstream/health.rs`) ticker idiom.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::Session;

/// Index + capacity/TTL policy over live sessions. All operations are safe
/// under concurrent calls; the read-write lock is only held during index
/// mutation, never across a handler invocation.
pub struct SessionManager {
    by_id: RwLock<HashMap<String, Arc<Session>>>,
    by_socket: RwLock<HashMap<String, Arc<Session>>>,
    capacity: usize,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            by_id: RwLock::new(HashMap::new()),
            by_socket: RwLock::new(HashMap::new()),
            capacity,
            ttl,
        }
    }

    /// Insert a session, evicting the oldest-by-last-activity session first
    /// if at capacity. Returns the evicted session, if any, so the caller
    /// can terminate it.
    pub async fn insert(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        let mut by_id = self.by_id.write().await;
        let mut by_socket = self.by_socket.write().await;

        let evicted = if by_id.len() >= self.capacity {
            let oldest_id = by_id
                .values()
                .min_by_key(|s| s.last_activity_ms())
                .map(|s| s.id.clone());
            oldest_id.and_then(|id| {
                let evicted = by_id.remove(&id);
                if let Some(ref s) = evicted {
                    by_socket.remove(&s.socket_id);
                }
                evicted
            })
        } else {
            None
        };

        by_id.insert(session.id.clone(), session.clone());
        by_socket.insert(session.socket_id.clone(), session);
        evicted
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.by_id.read().await.get(id).cloned()
    }

    pub async fn get_by_socket(&self, socket_id: &str) -> Option<Arc<Session>> {
        self.by_socket.read().await.get(socket_id).cloned()
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let mut by_id = self.by_id.write().await;
        let session = by_id.remove(id)?;
        self.by_socket.write().await.remove(&session.socket_id);
        Some(session)
    }

    pub async fn len(&self) -> usize {
        self.by_id.read().await.len()
    }

    /// Sessions idle strictly longer than the configured TTL, removed from
    /// the index as they're found. Callers terminate each returned session
    /// with `TerminateReason::Timeout`.
    pub async fn sweep_expired(&self) -> Vec<Arc<Session>> {
        let ttl_ms = self.ttl.as_millis() as u64;
        let expired_ids: Vec<String> = {
            let by_id = self.by_id.read().await;
            by_id
                .values()
                .filter(|s| s.idle_for_ms() > ttl_ms)
                .map(|s| s.id.clone())
                .collect()
        };

        let mut expired = Vec::with_capacity(expired_ids.len());
        for id in expired_ids {
            if let Some(session) = self.remove(&id).await {
                expired.push(session);
            }
        }
        expired
    }
}

/// Spawn the periodic TTL sweep. Mirrors the teacher's health-check ticker:
/// a `tokio::time::interval` racing the shutdown token, skipping missed
/// ticks rather than bursting catch-up work.
pub fn spawn_ttl_sweep(
    manager: Arc<SessionManager>,
    interval: Duration,
    shutdown: CancellationToken,
    on_expired: impl Fn(Arc<Session>) + Send + Sync + 'static,
) {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            for session in manager.sweep_expired().await {
                on_expired(session);
            }
        }
    });
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
