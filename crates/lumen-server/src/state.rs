// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide application state, grounded in the teacher's `MuxState`
//! (`crates/mux/src/state.rs`): one struct holding every shared collaborator,
//! built once in `run` and handed to the router as `Arc<AppState>`. Unlike
//! `MuxState`, which indexes one kind of entry (registered upstream
//! sessions), this state additionally tracks the two HTTP-request-scoped
//! fallback transports (SSE, long-poll) by client id, since those transports
//! have no persistent socket for the HTTP layer to hang routing off of.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use ring::hmac;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use lumen_core::codec::Envelope;
use lumen_core::HookBus;

use crate::buffer_pool::BufferPool;
use crate::config::{Config, TimeoutTable};
use crate::dispatcher::Dispatcher;
use crate::pubsub::InProcessPubSub;
use crate::rate_limit::RateLimitMiddleware;
use crate::recovery::RecoveryStore;
use crate::registry::ComponentRegistry;
use crate::session::SessionManager;
use crate::transport::long_poll::LongPollTransport;

/// Everything a request handler needs, shared process-wide.
pub struct AppState {
    pub config: Arc<Config>,
    pub timeouts: TimeoutTable,
    pub manager: Arc<SessionManager>,
    pub pubsub: Arc<InProcessPubSub>,
    pub hooks: Arc<HookBus>,
    pub recovery: Arc<RecoveryStore>,
    pub presence: Arc<lumen_core::presence::PresenceRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub components: Arc<ComponentRegistry>,
    pub buffers: Arc<BufferPool>,
    pub hmac_key: Arc<hmac::Key>,
    pub shutdown: CancellationToken,

    /// SSE companion-POST routing: socket id -> the sender the session's
    /// inbound half reads from. Populated when the GET stream opens, removed
    /// when the session terminates.
    sse_inbound: RwLock<HashMap<String, mpsc::Sender<Envelope>>>,
    /// Long-poll state by client id, populated on `connect`, removed on
    /// `disconnect` or session termination.
    long_poll: RwLock<HashMap<String, LongPollTransport>>,
    /// Live connection count per source IP, enforcing
    /// `max_connections_per_ip` when it's non-zero.
    connections_per_ip: Mutex<HashMap<IpAddr, u32>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let timeouts = config.timeouts();
        let hmac_secret = config.resolve_hmac_secret();
        let recovery_ttl = config.recovery_ttl();
        let rate_limit = config.rate_limit_per_second;
        let max_subscriptions = config.max_subscriptions;
        let max_connections = config.max_connections;
        let session_ttl = config.session_ttl();

        let mut dispatcher = Dispatcher::new(timeouts.event);
        dispatcher.use_middleware(RateLimitMiddleware::new(rate_limit));
        dispatcher.on_default(|envelope| Box::pin(async move { Ok(envelope) }));

        let mut components = ComponentRegistry::new();
        components.register("counter", || Box::new(crate::demo::CounterComponent::new()));

        Self {
            config: Arc::new(config),
            timeouts,
            manager: Arc::new(SessionManager::new(max_connections, session_ttl)),
            pubsub: Arc::new(InProcessPubSub::new(max_subscriptions)),
            hooks: Arc::new(HookBus::new(64)),
            recovery: Arc::new(RecoveryStore::new(&hmac_secret, recovery_ttl)),
            presence: Arc::new(lumen_core::presence::PresenceRegistry::new()),
            dispatcher: Arc::new(dispatcher),
            components: Arc::new(components),
            buffers: Arc::new(BufferPool::new()),
            hmac_key: Arc::new(hmac::Key::new(hmac::HMAC_SHA256, &hmac_secret)),
            shutdown: CancellationToken::new(),
            sse_inbound: RwLock::new(HashMap::new()),
            long_poll: RwLock::new(HashMap::new()),
            connections_per_ip: Mutex::new(HashMap::new()),
        }
    }

    pub async fn register_sse_inbound(&self, socket_id: String, sender: mpsc::Sender<Envelope>) {
        self.sse_inbound.write().await.insert(socket_id, sender);
    }

    pub async fn sse_inbound_for(&self, socket_id: &str) -> Option<mpsc::Sender<Envelope>> {
        self.sse_inbound.read().await.get(socket_id).cloned()
    }

    pub async fn remove_sse_inbound(&self, socket_id: &str) {
        self.sse_inbound.write().await.remove(socket_id);
    }

    pub async fn register_long_poll(&self, client_id: String, transport: LongPollTransport) {
        self.long_poll.write().await.insert(client_id, transport);
    }

    pub async fn long_poll_for(&self, client_id: &str) -> Option<LongPollTransport> {
        self.long_poll.read().await.get(client_id).cloned()
    }

    pub async fn remove_long_poll(&self, client_id: &str) {
        self.long_poll.write().await.remove(client_id);
    }

    /// Returns `true` if the new connection is admitted (and counted); the
    /// caller rejects with 429 on `false`. `0` disables the check.
    pub async fn try_admit_ip(&self, ip: IpAddr) -> bool {
        let limit = self.config.max_connections_per_ip;
        if limit == 0 {
            return true;
        }
        let mut counts = self.connections_per_ip.lock().await;
        let count = counts.entry(ip).or_insert(0);
        if *count >= limit {
            return false;
        }
        *count += 1;
        true
    }

    pub async fn release_ip(&self, ip: IpAddr) {
        let mut counts = self.connections_per_ip.lock().await;
        if let Some(count) = counts.get_mut(&ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(&ip);
            }
        }
    }
}
