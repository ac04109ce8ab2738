// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `lumen-server` binary and
//! exercise the WebSocket, long-poll, and HTTP render surfaces.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use lumen_specs::LumenProcess;

const TIMEOUT: Duration = Duration::from_secs(10);

/// Unpack a decoded tuple-form envelope `[join_ref, ref, topic, event,
/// payload]` into its event name and payload, panicking (test-only) if the
/// frame isn't shaped that way.
fn tuple_event(value: &Value) -> (&str, &Value) {
    let items = value.as_array().expect("envelope must be a tuple");
    assert_eq!(items.len(), 5, "envelope must be a 5-tuple");
    (items[3].as_str().expect("event must be a string"), &items[4])
}

async fn recv_json(
    ws: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> anyhow::Result<Value> {
    let msg = tokio::time::timeout(TIMEOUT, ws.next())
        .await?
        .ok_or_else(|| anyhow::anyhow!("ws stream ended"))??;
    let text = match msg {
        Message::Text(t) => t.to_string(),
        other => anyhow::bail!("expected text ws message, got: {other:?}"),
    };
    Ok(serde_json::from_str(&text)?)
}

// -- WebSocket ----------------------------------------------------------------

#[tokio::test]
async fn ws_join_renders_full_html() -> anyhow::Result<()> {
    let lumen = LumenProcess::start()?;
    lumen.wait_healthy(TIMEOUT).await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(lumen.ws_url("counter")).await?;
    ws.send(Message::Text(json!(["1", "1", "lv:test", "phx_join", {}]).to_string().into())).await?;

    let reply = recv_json(&mut ws).await?;
    let (event, payload) = tuple_event(&reply);
    assert_eq!(event, "phx_reply");
    assert_eq!(payload["status"], "ok");
    let rendered = payload["response"]["rendered"]["s"][0].as_str().expect("rendered html");
    assert!(rendered.contains("data-slot=\"s0\""));
    assert!(rendered.contains('0'));

    Ok(())
}

#[tokio::test]
async fn ws_increment_replies_then_emits_diff() -> anyhow::Result<()> {
    let lumen = LumenProcess::start()?;
    lumen.wait_healthy(TIMEOUT).await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(lumen.ws_url("counter")).await?;
    ws.send(Message::Text(json!(["1", "1", "lv:test", "phx_join", {}]).to_string().into())).await?;
    recv_json(&mut ws).await?; // join reply

    ws.send(Message::Text(json!(["1", "2", "lv:test", "increment", {}]).to_string().into())).await?;

    let reply = recv_json(&mut ws).await?;
    let (event, payload) = tuple_event(&reply);
    assert_eq!(event, "phx_reply");
    assert_eq!(payload["status"], "ok");

    let diff = recv_json(&mut ws).await?;
    let (event, payload) = tuple_event(&diff);
    assert_eq!(event, "diff");
    assert_eq!(payload["v"], 2);
    assert_eq!(payload["s"]["s0"], "1");
    assert!(payload.get("f").is_none());

    Ok(())
}

#[tokio::test]
async fn ws_heartbeat_replies_ok() -> anyhow::Result<()> {
    let lumen = LumenProcess::start()?;
    lumen.wait_healthy(TIMEOUT).await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(lumen.ws_url("counter")).await?;
    ws.send(Message::Text(json!([null, "7", "phoenix", "phx_heartbeat", {}]).to_string().into())).await?;

    let reply = recv_json(&mut ws).await?;
    let (event, payload) = tuple_event(&reply);
    assert_eq!(event, "phx_reply");
    assert_eq!(payload["status"], "ok");
    assert!(payload["response"].is_null());

    Ok(())
}

#[tokio::test]
async fn ws_upgrade_rejected_for_disallowed_origin() -> anyhow::Result<()> {
    let lumen = LumenProcess::build().enforce_origin(&["https://app.example"]).spawn()?;
    lumen.wait_healthy(TIMEOUT).await?;

    let mut request = lumen.ws_url("counter").into_client_request()?;
    request.headers_mut().insert("origin", "https://attacker.example".parse()?);

    let outcome = tokio_tungstenite::connect_async(request).await;
    assert!(outcome.is_err(), "upgrade from a disallowed origin must not succeed");

    Ok(())
}

// -- Long-poll ------------------------------------------------------------------

#[tokio::test]
async fn long_poll_connect_send_then_poll_roundtrips_a_diff() -> anyhow::Result<()> {
    let lumen = LumenProcess::start()?;
    lumen.wait_healthy(TIMEOUT).await?;

    let client = reqwest::Client::new();
    let connect: Value = client
        .post(format!("{}/live/counter/lp/connect", lumen.base_url()))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(connect["status"], "connected");
    let client_id = connect["client_id"].as_str().expect("client_id").to_owned();

    // The send endpoint treats a top-level JSON array as a batch of
    // messages, so a lone tuple-form envelope (itself a 5-element array)
    // must be wrapped in an outer array of one to avoid being unpacked as
    // five separate items.
    client
        .post(format!("{}/live/counter/lp/send?client_id={client_id}", lumen.base_url()))
        .json(&json!([["1", "1", "lv:test", "phx_join", {}]]))
        .send()
        .await?
        .error_for_status()?;

    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("long-poll never delivered the join reply");
        }
        let messages: Vec<Value> = client
            .get(format!("{}/live/counter/lp/poll?client_id={client_id}", lumen.base_url()))
            .send()
            .await?
            .json()
            .await?;
        if let Some(reply) = messages.iter().find(|m| tuple_event(m).0 == "phx_reply") {
            let (_, payload) = tuple_event(reply);
            assert_eq!(payload["status"], "ok");
            break;
        }
    }

    client
        .post(format!("{}/live/counter/lp/disconnect?client_id={client_id}", lumen.base_url()))
        .send()
        .await?
        .error_for_status()?;

    Ok(())
}

// -- HTTP render ------------------------------------------------------------

#[tokio::test]
async fn render_endpoint_mounts_and_renders_once() -> anyhow::Result<()> {
    let lumen = LumenProcess::start()?;
    lumen.wait_healthy(TIMEOUT).await?;

    let body = reqwest::get(format!("{}/live/counter", lumen.base_url())).await?.text().await?;
    assert!(body.contains("data-slot=\"s0\""));

    let missing = reqwest::get(format!("{}/live/does-not-exist", lumen.base_url())).await?;
    assert_eq!(missing.status().as_u16(), 400);

    Ok(())
}
