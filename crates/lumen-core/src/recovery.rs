// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recovery tokens: let a reconnecting client resume its prior session state
//! instead of re-mounting from scratch, without the server retaining a
//! server-side session table keyed by guessable ids. The token is
//! self-contained and HMAC-signed; `ring::hmac`'s verification is
//! constant-time, so no separate comparison helper is needed here.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::hmac;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The claims carried inside a recovery token: enough to rehydrate a session
/// without trusting the client for anything beyond "which socket, which
/// component, as of which state version".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryClaims {
    pub socket_id: String,
    pub component_name: String,
    pub state_version: u64,
    pub created_at: u64,
    pub expires_at: u64,
}

/// The wire shape: `base64(json({socket_id, component_name, state_version,
/// created_at, expires_at, signature}))`. `signature` is a base64-encoded
/// HMAC-SHA256 over `socket_id:component_name:state_version:created_at:expires_at`.
#[derive(Serialize, Deserialize)]
struct TokenWire {
    socket_id: String,
    component_name: String,
    state_version: u64,
    created_at: u64,
    expires_at: u64,
    signature: String,
}

/// Signs and verifies recovery tokens with a server-held HMAC-SHA256 key.
pub struct RecoverySigner {
    key: hmac::Key,
    ttl: Duration,
}

impl RecoverySigner {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self { key: hmac::Key::new(hmac::HMAC_SHA256, secret), ttl }
    }

    fn canonical(
        socket_id: &str,
        component_name: &str,
        state_version: u64,
        created_at: u64,
        expires_at: u64,
    ) -> String {
        format!("{socket_id}:{component_name}:{state_version}:{created_at}:{expires_at}")
    }

    /// Sign a fresh token for `socket_id`/`component_name` at `state_version`,
    /// expiring `ttl` from now.
    pub fn sign(&self, socket_id: &str, component_name: &str, state_version: u64) -> String {
        let created_at = now_secs();
        let expires_at = created_at + self.ttl.as_secs();
        let canonical =
            Self::canonical(socket_id, component_name, state_version, created_at, expires_at);
        let sig = hmac::sign(&self.key, canonical.as_bytes());

        let wire = TokenWire {
            socket_id: socket_id.to_owned(),
            component_name: component_name.to_owned(),
            state_version,
            created_at,
            expires_at,
            signature: URL_SAFE_NO_PAD.encode(sig.as_ref()),
        };
        let json = serde_json::to_vec(&wire).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Verify a token's signature and freshness, returning its claims.
    pub fn verify(&self, token: &str) -> Result<RecoveryClaims> {
        let json = URL_SAFE_NO_PAD.decode(token).map_err(|_| Error::TokenInvalid)?;
        let wire: TokenWire =
            serde_json::from_slice(&json).map_err(|_| Error::TokenInvalid)?;

        let canonical = Self::canonical(
            &wire.socket_id,
            &wire.component_name,
            wire.state_version,
            wire.created_at,
            wire.expires_at,
        );
        let sig = URL_SAFE_NO_PAD.decode(&wire.signature).map_err(|_| Error::TokenInvalid)?;
        hmac::verify(&self.key, canonical.as_bytes(), &sig).map_err(|_| Error::TokenInvalid)?;

        if now_secs() > wire.expires_at {
            return Err(Error::TokenExpired);
        }

        Ok(RecoveryClaims {
            socket_id: wire.socket_id,
            component_name: wire.component_name,
            state_version: wire.state_version,
            created_at: wire.created_at,
            expires_at: wire.expires_at,
        })
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
