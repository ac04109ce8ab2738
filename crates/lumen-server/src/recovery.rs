// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-side recovery store: binds a socket id to the snapshot a
//! reconnecting client's token entitles it to restore. Built on
//! `lumen_core::recovery::RecoverySigner` for the token itself and a
//! TTL-pruned map for the snapshot, the same shape as the teacher's
//! `MuxState::sessions` table.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;

use lumen_core::recovery::RecoverySigner;
use lumen_core::{Error, Result};

use crate::component::AssignsSnapshot;
use crate::session::epoch_ms;

/// What a clean disconnect saves, and what a reconnect restores.
#[derive(Debug, Clone)]
pub struct StoredState {
    pub component_name: String,
    pub assigns: AssignsSnapshot,
    pub state_version: u64,
    pub stored_at_ms: u64,
}

/// Recovery-token issuance plus the snapshot table it's redeemed against.
/// A token alone only proves "this socket id, as of this version, was
/// valid at some point"; the store is what makes that claim redeemable.
pub struct RecoveryStore {
    signer: RecoverySigner,
    states: RwLock<HashMap<String, StoredState>>,
    ttl: Duration,
}

impl RecoveryStore {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self { signer: RecoverySigner::new(secret, ttl), states: RwLock::new(HashMap::new()), ttl }
    }

    /// Save a session's state on clean disconnect (or explicit save) and
    /// issue a token the client can present to resume it.
    pub async fn save(
        &self,
        socket_id: &str,
        component_name: &str,
        assigns: AssignsSnapshot,
        state_version: u64,
    ) -> String {
        let token = self.signer.sign(socket_id, component_name, state_version);
        let stored = StoredState {
            component_name: component_name.to_owned(),
            assigns,
            state_version,
            stored_at_ms: epoch_ms(),
        };
        self.states.write().await.insert(socket_id.to_owned(), stored);
        token
    }

    /// Verify a token and, if its claimed state is still on file and
    /// unexpired, return it for restoration. Consumes the entry: a
    /// recovery token is redeemable exactly once. The token's own
    /// `expires_at` already bounds its lifetime; the server-side TTL here
    /// additionally prunes an entry whose token was never redeemed.
    pub async fn redeem(&self, token: &str) -> Result<StoredState> {
        let claims = self.signer.verify(token)?;

        let mut states = self.states.write().await;
        let Some(stored) = states.get(&claims.socket_id) else { return Err(Error::TokenInvalid) };

        if stored.state_version != claims.state_version || stored.component_name != claims.component_name {
            return Err(Error::TokenInvalid);
        }
        if epoch_ms().saturating_sub(stored.stored_at_ms) > self.ttl.as_millis() as u64 {
            states.remove(&claims.socket_id);
            return Err(Error::TokenExpired);
        }

        let Some(stored) = states.remove(&claims.socket_id) else { return Err(Error::TokenInvalid) };
        Ok(stored)
    }

    /// Drop expired entries that were never redeemed. Intended to be driven
    /// by the same periodic sweep that ages out sessions.
    pub async fn sweep_expired(&self) {
        let ttl_ms = self.ttl.as_millis() as u64;
        let now = epoch_ms();
        self.states.write().await.retain(|_, stored| now.saturating_sub(stored.stored_at_ms) <= ttl_ms);
    }
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
