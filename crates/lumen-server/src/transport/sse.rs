// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fallback transport: Server-Sent Events for the outbound half, paired
//! with a companion POST endpoint for inbound messages (wired up in
//! `lumen-server`'s HTTP layer, not here — this module owns the framing and
//! queue plumbing, matching the way `transport::ws` owns socket loops
//! without knowing about axum routing).

use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue};
use axum::response::sse::Event;
use futures_util::stream::{self, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use lumen_core::codec::{Codec, Envelope};

use crate::transport::{TransportHandle, TransportKind, DEFAULT_SEND_QUEUE_DEPTH};

#[derive(Debug, Clone)]
pub struct SseConfig {
    pub allowed_origins: Vec<String>,
    pub heartbeat_interval: Duration,
    pub send_queue_depth: usize,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            heartbeat_interval: Duration::from_secs(15),
            send_queue_depth: DEFAULT_SEND_QUEUE_DEPTH,
        }
    }
}

/// CORS echo of the request's Origin header, only when it's in the
/// allow-list (no wildcard by default, unlike the WS/long-poll checks).
pub fn cors_allow_origin(headers: &HeaderMap, allowed: &[String]) -> Option<HeaderValue> {
    let origin = headers.get(axum::http::header::ORIGIN)?.to_str().ok()?;
    if allowed.iter().any(|o| o == origin) {
        HeaderValue::from_str(origin).ok()
    } else {
        None
    }
}

/// Open an outbound-only SSE connection. Returns the transport handle the
/// session writes diffs into, an inbound sender the companion POST handler
/// feeds, an inbound receiver the session's message loop reads, and the
/// axum event stream to return as the response body. The stream ends (so
/// the HTTP response closes cleanly) once `cancel` fires.
pub fn open(
    config: SseConfig,
    codec: Codec,
    cancel: CancellationToken,
) -> (
    TransportHandle,
    mpsc::Sender<Envelope>,
    mpsc::Receiver<Envelope>,
    impl Stream<Item = Result<Event, Infallible>>,
) {
    let (handle, outbound_rx) = TransportHandle::new(TransportKind::Sse, config.send_queue_depth);
    let (inbound_tx, inbound_rx) = mpsc::channel(config.send_queue_depth);
    let next_id = Arc::new(AtomicU64::new(1));

    let data_stream = ReceiverStream::new(outbound_rx).map(move |envelope| {
        let id = next_id.fetch_add(1, Ordering::Relaxed);
        match codec.encode(&envelope) {
            Ok(bytes) => Event::default()
                .id(id.to_string())
                .event(envelope.event.clone())
                .data(String::from_utf8_lossy(&bytes).into_owned()),
            Err(_) => Event::default().id(id.to_string()).comment("encode_error"),
        }
    });

    // Periodic heartbeat comments keep intermediary proxies from timing out
    // an otherwise-idle connection; merged into the same stream rather than
    // a second response body, since SSE allows only one.
    let heartbeat_stream = stream::unfold(tokio::time::interval(config.heartbeat_interval), |mut ticker| async {
        ticker.tick().await;
        Some((Event::default().comment("heartbeat"), ticker))
    });

    let merged = stream::select(data_stream, heartbeat_stream).map(Ok);
    let stream = merged.take_until(async move { cancel.cancelled().await });
    (handle, inbound_tx, inbound_rx, stream)
}

/// Decode a companion POST body — one JSON message per line — into
/// envelopes. Malformed lines are reported individually rather than
/// failing the whole batch, since one bad line in a multi-message POST
/// shouldn't drop the others.
pub fn decode_post_body(codec: &Codec, body: &str) -> Vec<lumen_core::Result<Envelope>> {
    body.lines().map(str::trim).filter(|line| !line.is_empty()).map(|line| codec.decode(line.as_bytes())).collect()
}

#[cfg(test)]
#[path = "sse_tests.rs"]
mod tests;
