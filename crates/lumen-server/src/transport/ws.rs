// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Primary transport: WebSocket. Origin is validated before upgrade; once
//! live, the connection runs three concurrent loops — read, write, ping —
//! grounded in the teacher's `transport::ws::handle_ws`
//! (`crates/mux/src/transport/ws.rs`), generalized from a single relay loop
//! into independently cancellable tasks so a slow write never stalls reads.
//! The write loop is the sole writer to the socket (per the concurrency
//! model's "no socket-level lock beyond the queue"); the ping loop and the
//! read loop's pong replies both hand their frames to it through channels
//! rather than writing directly.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::http::HeaderMap;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use lumen_core::codec::{Codec, Envelope};

use crate::error::ServerError;
use crate::transport::auth::check_origin;
use crate::transport::{TransportHandle, TransportKind, DEFAULT_SEND_QUEUE_DEPTH};

/// Query parameters accepted on the upgrade request (`?token=...` for
/// environments that gate upgrades with a bearer token instead of cookies).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WsUpgradeQuery {
    pub token: Option<String>,
}

/// Everything the WS loop needs beyond the generic transport contract.
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub allowed_origins: Vec<String>,
    pub insecure_dev_mode: bool,
    pub max_message_size: usize,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub ping_interval: Duration,
    pub send_queue_depth: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            insecure_dev_mode: false,
            max_message_size: 512 * 1024,
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(20),
            send_queue_depth: DEFAULT_SEND_QUEUE_DEPTH,
        }
    }
}

/// Validate the Origin header before `WebSocketUpgrade::on_upgrade` is
/// called. Rejection here must short-circuit the HTTP response with 403
/// before any socket is accepted, per the spec's origin-rejection scenario.
pub fn check_upgrade(headers: &HeaderMap, config: &WsConfig) -> Result<(), ServerError> {
    check_origin(headers, &config.allowed_origins, config.insecure_dev_mode)
}

/// Accept an already-upgraded [`WebSocket`] and spawn its three loops,
/// returning the handle the session owns and the receiver the session's
/// message loop reads inbound envelopes from.
pub fn accept(
    socket: WebSocket,
    config: WsConfig,
    codec: Codec,
    cancel: CancellationToken,
) -> (TransportHandle, mpsc::Receiver<Envelope>) {
    let (handle, mut outbound_rx) = TransportHandle::new(TransportKind::Ws, config.send_queue_depth);
    let (inbound_tx, inbound_rx) = mpsc::channel(config.send_queue_depth);
    let (control_tx, mut control_rx) = mpsc::channel::<Message>(16);

    let (mut ws_tx, mut ws_rx) = socket.split();
    let closer = handle.clone();

    // Write loop: the sole writer to the socket. Drains outbound envelopes
    // and control frames (pongs, pings) from two channels.
    {
        let cancel = cancel.clone();
        let codec = codec;
        let write_timeout = config.write_timeout;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    maybe_env = outbound_rx.recv() => {
                        let Some(envelope) = maybe_env else { break };
                        let Ok(bytes) = codec.encode(&envelope) else { continue };
                        let send = ws_tx.send(Message::Text(String::from_utf8_lossy(&bytes).into_owned().into()));
                        if tokio::time::timeout(write_timeout, send).await.is_err() {
                            break;
                        }
                    }
                    maybe_ctrl = control_rx.recv() => {
                        let Some(frame) = maybe_ctrl else { break };
                        if ws_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                }
            }
            let _ = ws_tx.close().await;
        });
    }

    // Ping loop: a periodic timer that hands a Ping frame to the write loop
    // rather than writing the socket itself.
    {
        let cancel = cancel.clone();
        let control_tx = control_tx.clone();
        let interval = config.ping_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if control_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    // Read loop: decode inbound frames, answer pings with pongs (via the
    // write loop), and forward decoded envelopes to the session.
    {
        let read_timeout = config.read_timeout;
        tokio::spawn(async move {
            loop {
                let next = tokio::time::timeout(read_timeout, ws_rx.next());
                let message = tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = next => result,
                };
                let Ok(Some(message)) = message else { break };
                match message {
                    Ok(Message::Text(text)) => {
                        match codec.decode(text.as_bytes()) {
                            Ok(envelope) => {
                                if inbound_tx.send(envelope).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => debug!(%err, "dropping malformed ws frame"),
                        }
                    }
                    Ok(Message::Binary(bytes)) => {
                        if let Ok(envelope) = codec.decode(&bytes) {
                            if inbound_tx.send(envelope).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        if control_tx.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(_)) | Err(_) => break,
                }
            }
            closer.close();
        });
    }

    (handle, inbound_rx)
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
