// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Upgrade-time auth: bearer tokens and Origin checks, grounded in the
//! teacher's `transport::auth` (`constant_time_eq`, `validate_bearer`,
//! `validate_ws_query`), plus signed long-poll client ids built the way
//! recovery tokens are (`ring::hmac`, base64url).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::http::HeaderMap;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use ring::hmac;

use crate::error::ServerError;

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate a Bearer token from HTTP headers. `expected = None` disables
/// bearer auth entirely (dev mode / no token configured).
pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ServerError> {
    let Some(expected) = expected else { return Ok(()) };

    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(ServerError::Unauthorized)?;
    let token = header.strip_prefix("Bearer ").ok_or(ServerError::Unauthorized)?;

    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(ServerError::Unauthorized)
    }
}

/// Validate a token carried in a WebSocket upgrade query string
/// (`?token=...`).
pub fn validate_ws_query(query: &str, expected: Option<&str>) -> Result<(), ServerError> {
    let Some(expected) = expected else { return Ok(()) };

    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("token=") {
            if constant_time_eq(value, expected) {
                return Ok(());
            }
        }
    }
    Err(ServerError::Unauthorized)
}

/// Check the `Origin` header against an allow-list. `insecure_dev_mode`
/// disables the check entirely; a single `"*"` entry allows any origin.
pub fn check_origin(
    headers: &HeaderMap,
    allowed: &[String],
    insecure_dev_mode: bool,
) -> Result<(), ServerError> {
    if insecure_dev_mode {
        return Ok(());
    }
    if allowed.iter().any(|o| o == "*") {
        return Ok(());
    }

    let origin = headers
        .get(axum::http::header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .ok_or(ServerError::UpgradeRejected)?;

    if allowed.iter().any(|o| o == origin) {
        Ok(())
    } else {
        Err(ServerError::UpgradeRejected)
    }
}

/// Signed, stateless long-poll client ids: `b64(random16)|unix_secs.b64(hmac)`.
/// Verification recomputes the signature and checks freshness against a TTL,
/// so the server never needs to track issued ids server-side.
pub struct LongPollClientId;

impl LongPollClientId {
    pub fn generate(key: &hmac::Key) -> String {
        let mut random = [0u8; 16];
        rand::rng().fill_bytes(&mut random);
        let payload = format!("{}|{}", URL_SAFE_NO_PAD.encode(random), now_secs());
        let signature = hmac::sign(key, payload.as_bytes());
        format!("{}.{}", payload, URL_SAFE_NO_PAD.encode(signature.as_ref()))
    }

    pub fn verify(key: &hmac::Key, id: &str, ttl: Duration) -> Result<(), ServerError> {
        let (payload, signature_b64) = id.split_once('.').ok_or(ServerError::ClientIdInvalid)?;
        let signature =
            URL_SAFE_NO_PAD.decode(signature_b64).map_err(|_| ServerError::ClientIdInvalid)?;
        hmac::verify(key, payload.as_bytes(), &signature)
            .map_err(|_| ServerError::ClientIdInvalid)?;

        let (_, issued_at) = payload.split_once('|').ok_or(ServerError::ClientIdInvalid)?;
        let issued_at: u64 = issued_at.parse().map_err(|_| ServerError::ClientIdInvalid)?;
        if now_secs().saturating_sub(issued_at) > ttl.as_secs() {
            return Err(ServerError::ClientIdInvalid);
        }
        Ok(())
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
