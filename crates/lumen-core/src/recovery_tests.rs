// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;

#[test]
fn round_trip_sign_and_verify() {
    let signer = RecoverySigner::new(b"super-secret-key", Duration::from_secs(60));
    let token = signer.sign("sock-1", "counter", 7);
    let claims = signer.verify(&token).expect("verifies");
    assert_eq!(claims.socket_id, "sock-1");
    assert_eq!(claims.component_name, "counter");
    assert_eq!(claims.state_version, 7);
    assert!(claims.expires_at > claims.created_at);
}

#[test]
fn token_is_base64_json() {
    let signer = RecoverySigner::new(b"key", Duration::from_secs(60));
    let token = signer.sign("sock-1", "counter", 1);
    let json = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(&token)
        .expect("valid base64");
    let value: serde_json::Value = serde_json::from_slice(&json).expect("valid json");
    assert_eq!(value["socket_id"], "sock-1");
    assert_eq!(value["component_name"], "counter");
    assert_eq!(value["state_version"], 1);
    assert!(value.get("signature").is_some());
}

#[test]
fn wrong_key_rejects() {
    let signer = RecoverySigner::new(b"key-a", Duration::from_secs(60));
    let token = signer.sign("sock-1", "counter", 1);

    let other = RecoverySigner::new(b"key-b", Duration::from_secs(60));
    assert_eq!(other.verify(&token), Err(Error::TokenInvalid));
}

#[test]
fn tampered_payload_rejects() {
    let signer = RecoverySigner::new(b"key", Duration::from_secs(60));
    let token = signer.sign("sock-1", "counter", 1);

    let json = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(&token)
        .expect("valid base64");
    let mut value: serde_json::Value = serde_json::from_slice(&json).expect("valid json");
    value["socket_id"] = serde_json::Value::String("sock-2".to_owned());
    let forged = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .encode(serde_json::to_vec(&value).expect("serializes"));

    assert_eq!(signer.verify(&forged), Err(Error::TokenInvalid));
}

#[test]
fn malformed_token_rejects() {
    let signer = RecoverySigner::new(b"key", Duration::from_secs(60));
    assert_eq!(signer.verify("not-a-token"), Err(Error::TokenInvalid));
    assert_eq!(signer.verify(""), Err(Error::TokenInvalid));
}

#[test]
fn expired_token_rejects_with_distinct_error() {
    let signer = RecoverySigner::new(b"key", Duration::from_secs(0));
    let token = signer.sign("sock-1", "counter", 1);
    std::thread::sleep(Duration::from_millis(1100));
    assert_eq!(signer.verify(&token), Err(Error::TokenExpired));
}
