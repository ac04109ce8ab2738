// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP surface: the route table every external interface hangs off of,
//! assembled the way the teacher's `transport::build_router`
//! (`crates/mux/src/transport/mod.rs`) assembles its own — a flat
//! `Router::new().route(...)` chain closed with `.with_state`. Unlike the
//! teacher, which routes a single upgrade per path, each component name gets
//! three connection styles off the same `{name}` segment: a plain `GET`
//! renders once and returns, an `Upgrade: websocket` header on that same
//! `GET` opens the primary transport, and a pair of sibling paths carry the
//! SSE and long-poll fallbacks described in the external-interfaces section
//! of the design doc.

use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocket;
use axum::extract::{ConnectInfo, Path, Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value as Json_};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;

use lumen_core::codec::{Codec, CodecConfig, Envelope};

use crate::component::{Component, MountContext, TerminateReason};
use crate::error::ServerError;
use crate::session::runtime::{spawn as spawn_session, RuntimeDeps};
use crate::session::Session;
use crate::state::AppState;
use crate::transport::auth::LongPollClientId;
use crate::transport::long_poll::{LongPollConfig, LongPollTransport};
use crate::transport::sse::{self, SseConfig};
use crate::transport::ws::{self, WsConfig};
use crate::transport::DEFAULT_SEND_QUEUE_DEPTH;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/live/{name}", get(render_handler))
        .route("/live/{name}/ws", get(ws_handler))
        .route("/live/{name}/sse", get(sse_connect).post(sse_inbound))
        .route("/live/{name}/lp/connect", post(lp_connect))
        .route("/live/{name}/lp/poll", get(lp_poll))
        .route("/live/{name}/lp/send", post(lp_send))
        .route("/live/{name}/lp/disconnect", post(lp_disconnect))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ClientIdQuery {
    client_id: Option<String>,
}

fn parse_cookies(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    let Some(raw) = headers.get(axum::http::header::COOKIE).and_then(|v| v.to_str().ok()) else {
        return out;
    };
    for pair in raw.split(';') {
        if let Some((k, v)) = pair.trim().split_once('=') {
            out.insert(k.trim().to_owned(), v.trim().to_owned());
        }
    }
    out
}

fn mount_context(params: HashMap<String, String>, headers: &HeaderMap) -> MountContext {
    MountContext { params: params.into_iter().collect(), session_bag: parse_cookies(headers) }
}

fn no_such_component(name: &str) -> Response {
    ServerError::NoHandler.to_http_response(format!("no component registered as {name}")).into_response()
}

fn too_many_connections() -> Response {
    ServerError::Full.to_http_response("too many connections from this address").into_response()
}

fn ws_config(state: &AppState) -> WsConfig {
    WsConfig {
        allowed_origins: state.config.allowed_origins.clone(),
        insecure_dev_mode: state.config.insecure_dev_mode,
        max_message_size: state.config.max_message_size,
        read_timeout: state.timeouts.websocket_read,
        write_timeout: state.timeouts.websocket_write,
        ping_interval: Duration::from_secs(20),
        send_queue_depth: DEFAULT_SEND_QUEUE_DEPTH,
    }
}

fn sse_config(state: &AppState) -> SseConfig {
    SseConfig {
        allowed_origins: state.config.allowed_origins.clone(),
        heartbeat_interval: Duration::from_secs(15),
        send_queue_depth: DEFAULT_SEND_QUEUE_DEPTH,
    }
}

fn long_poll_config(state: &AppState) -> LongPollConfig {
    LongPollConfig {
        queue_cap: state.config.long_poll_queue_cap,
        send_queue_depth: DEFAULT_SEND_QUEUE_DEPTH,
        poll_timeout: Duration::from_secs(25),
    }
}

/// Register the session in the manager, evicting the oldest connection if at
/// capacity, and hand it off to the message loop.
async fn install_session(
    state: &Arc<AppState>,
    session: Arc<Session>,
    inbound_rx: tokio::sync::mpsc::Receiver<Envelope>,
    mount_ctx: MountContext,
) {
    if let Some(evicted) = state.manager.insert(session.clone()).await {
        evicted.cancel.cancel();
    }

    let deps = Arc::new(RuntimeDeps {
        manager: state.manager.clone(),
        pubsub: state.pubsub.clone(),
        hooks: state.hooks.clone(),
        recovery: state.recovery.clone(),
        presence: state.presence.clone(),
        dispatcher: state.dispatcher.clone(),
        timeouts: state.timeouts,
    });

    spawn_session(session, inbound_rx, mount_ctx, deps, DEFAULT_SEND_QUEUE_DEPTH).await;
}

/// Cancel a transport-specific token and release any per-connection
/// bookkeeping once the session's own lifetime token fires, whichever reason
/// it fired for (client leave, idle eviction, capacity eviction, or server
/// shutdown cascading down from `AppState::shutdown`).
fn link_lifetime(state: &Arc<AppState>, session: &Arc<Session>, on_close: impl FnOnce() + Send + 'static) {
    let cancel = session.cancel.clone();
    tokio::spawn(async move {
        cancel.cancelled().await;
        on_close();
    });
}

// ---------------------------------------------------------------------
// Primary transport: one-shot render (plain GET) or WebSocket upgrade.
// ---------------------------------------------------------------------

/// `GET /live/{name}`: mount, render once, terminate without ever entering
/// the session manager. Serves the initial server-rendered page load a
/// client's WebSocket then connects against at the sibling `/ws` path.
async fn render_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let ctx = mount_context(params, &headers);
    render_once(state, name, ctx).await
}

/// `GET /live/{name}/ws`: origin-checked WebSocket upgrade, the primary
/// transport.
async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let ctx = mount_context(params, &headers);
    upgrade_websocket(state, name, ctx, addr, headers, ws).await
}

async fn render_once(state: Arc<AppState>, name: String, ctx: MountContext) -> Response {
    let Some(mut component) = state.components.build(&name) else {
        return no_such_component(&name);
    };

    match tokio::time::timeout(state.timeouts.mount, component.mount(&ctx)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            let message = err.to_string();
            return ServerError::from(err).to_http_response(message).into_response();
        }
        Err(_elapsed) => return ServerError::Timeout.to_http_response("mount timed out").into_response(),
    }

    let rendered = tokio::time::timeout(state.timeouts.render, component.render()).await;
    component.terminate(TerminateReason::Normal).await;

    match rendered {
        Ok(Ok(html)) => Html(html).into_response(),
        Ok(Err(err)) => {
            let message = err.to_string();
            ServerError::from(err).to_http_response(message).into_response()
        }
        Err(_elapsed) => ServerError::Timeout.to_http_response("render timed out").into_response(),
    }
}

async fn upgrade_websocket(
    state: Arc<AppState>,
    name: String,
    ctx: MountContext,
    addr: SocketAddr,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let config = ws_config(&state);

    if let Err(err) = ws::check_upgrade(&headers, &config) {
        return err.to_http_response("origin rejected").into_response();
    }
    if state.components.build(&name).is_none() {
        return no_such_component(&name);
    }
    if !state.try_admit_ip(addr.ip()).await {
        return too_many_connections();
    }

    let max_message_size = config.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| async move {
            run_ws_session(state, name, ctx, config, addr.ip(), socket).await;
        })
        .into_response()
}

async fn run_ws_session(
    state: Arc<AppState>,
    name: String,
    ctx: MountContext,
    config: WsConfig,
    ip: IpAddr,
    socket: WebSocket,
) {
    let Some(component) = state.components.build(&name) else {
        state.release_ip(ip).await;
        return;
    };

    let socket_id = Uuid::new_v4().to_string();
    let session_id = Uuid::new_v4().to_string();
    let topic = format!("lv:{socket_id}");
    let codec = Codec::new(CodecConfig::default());

    let socket_cancel = CancellationToken::new();
    let (handle, inbound_rx) = ws::accept(socket, config, codec, socket_cancel.clone());
    let session = Session::new(session_id, socket_id, topic, component, handle, &state.shutdown);

    link_lifetime(&state, &session, {
        let state = state.clone();
        move || {
            socket_cancel.cancel();
            tokio::spawn(async move { state.release_ip(ip).await });
        }
    });

    install_session(&state, session, inbound_rx, ctx).await;
}

// ---------------------------------------------------------------------
// Fallback transport: Server-Sent Events (outbound) + companion POST
// (inbound).
// ---------------------------------------------------------------------

async fn sse_connect(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let Some(component) = state.components.build(&name) else {
        return no_such_component(&name);
    };
    if !state.try_admit_ip(addr.ip()).await {
        return too_many_connections();
    }

    let socket_id = params.get("client_id").cloned().unwrap_or_else(|| Uuid::new_v4().to_string());
    let ctx = mount_context(params, &headers);
    let session_id = Uuid::new_v4().to_string();
    let topic = format!("lv:{socket_id}");
    let codec = Codec::new(CodecConfig::default());

    let config = sse_config(&state);
    let cors_origin = sse::cors_allow_origin(&headers, &config.allowed_origins);

    let socket_cancel = CancellationToken::new();
    let (handle, inbound_tx, inbound_rx, stream) = sse::open(config, codec, socket_cancel.clone());
    let session = Session::new(session_id, socket_id.clone(), topic, component, handle, &state.shutdown);

    state.register_sse_inbound(socket_id.clone(), inbound_tx).await;

    link_lifetime(&state, &session, {
        let state = state.clone();
        let ip = addr.ip();
        let socket_id = socket_id.clone();
        move || {
            socket_cancel.cancel();
            tokio::spawn(async move {
                state.release_ip(ip).await;
                state.remove_sse_inbound(&socket_id).await;
            });
        }
    });

    install_session(&state, session, inbound_rx, ctx).await;

    let mut response = axum::response::sse::Sse::new(stream).into_response();
    if let Some(origin) = cors_origin {
        response.headers_mut().insert(axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    response
}

async fn sse_inbound(
    State(state): State<Arc<AppState>>,
    Path(_name): Path<String>,
    Query(q): Query<ClientIdQuery>,
    body: String,
) -> Response {
    let Some(client_id) = q.client_id else {
        return ServerError::ClientIdInvalid.to_http_response("missing client_id").into_response();
    };
    let Some(sender) = state.sse_inbound_for(&client_id).await else {
        return ServerError::ClientIdInvalid.to_http_response("unknown sse client").into_response();
    };

    let codec = Codec::new(CodecConfig::default());
    for result in sse::decode_post_body(&codec, &body) {
        match result {
            Ok(envelope) => {
                let _ = sender.send(envelope).await;
            }
            Err(err) => warn!(%err, "dropping malformed sse inbound line"),
        }
    }
    StatusCode::OK.into_response()
}

// ---------------------------------------------------------------------
// Fallback transport: HTTP long-polling.
// ---------------------------------------------------------------------

async fn lp_connect(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let Some(component) = state.components.build(&name) else {
        return no_such_component(&name);
    };
    if !state.try_admit_ip(addr.ip()).await {
        return too_many_connections();
    }

    let ctx = mount_context(params, &headers);
    let client_id = LongPollClientId::generate(&state.hmac_key);
    let session_id = Uuid::new_v4().to_string();
    let topic = format!("lv:{client_id}");

    let (handle, transport, inbound_rx) = LongPollTransport::open(long_poll_config(&state));
    let session = Session::new(session_id, client_id.clone(), topic, component, handle, &state.shutdown);

    state.register_long_poll(client_id.clone(), transport).await;

    link_lifetime(&state, &session, {
        let state = state.clone();
        let ip = addr.ip();
        let client_id = client_id.clone();
        move || {
            tokio::spawn(async move {
                state.release_ip(ip).await;
                state.remove_long_poll(&client_id).await;
            });
        }
    });

    install_session(&state, session, inbound_rx, ctx).await;

    Json(json!({"client_id": client_id, "status": "connected"})).into_response()
}

fn verify_long_poll_client(state: &AppState, client_id: &str) -> Result<(), Response> {
    LongPollClientId::verify(&state.hmac_key, client_id, state.config.session_ttl())
        .map_err(|err| err.to_http_response("invalid or expired client id").into_response())
}

async fn lp_poll(
    State(state): State<Arc<AppState>>,
    Path(_name): Path<String>,
    Query(q): Query<ClientIdQuery>,
) -> Response {
    let Some(client_id) = q.client_id else {
        return ServerError::ClientIdInvalid.to_http_response("missing client_id").into_response();
    };
    if let Err(response) = verify_long_poll_client(&state, &client_id) {
        return response;
    }
    let Some(transport) = state.long_poll_for(&client_id).await else {
        return ServerError::ClientIdInvalid.to_http_response("unknown long-poll client").into_response();
    };

    let cancel = CancellationToken::new();
    let messages = transport.poll(&cancel, Duration::from_secs(25)).await;

    let codec = Codec::new(CodecConfig::default());
    let wire: Vec<Json_> = messages
        .iter()
        .filter_map(|envelope| codec.encode(envelope).ok())
        .filter_map(|bytes| serde_json::from_slice(&bytes).ok())
        .collect();

    Json(wire).into_response()
}

async fn lp_send(
    State(state): State<Arc<AppState>>,
    Path(_name): Path<String>,
    Query(q): Query<ClientIdQuery>,
    body: axum::body::Bytes,
) -> Response {
    let Some(client_id) = q.client_id else {
        return ServerError::ClientIdInvalid.to_http_response("missing client_id").into_response();
    };
    if let Err(response) = verify_long_poll_client(&state, &client_id) {
        return response;
    }
    let Some(transport) = state.long_poll_for(&client_id).await else {
        return ServerError::ClientIdInvalid.to_http_response("unknown long-poll client").into_response();
    };

    let Ok(value) = serde_json::from_slice::<Json_>(&body) else {
        return ServerError::MalformedFrame.to_http_response("invalid json body").into_response();
    };
    let items = match value {
        Json_::Array(items) => items,
        other => vec![other],
    };

    let codec = Codec::new(CodecConfig::default());
    for item in items {
        let Ok(bytes) = serde_json::to_vec(&item) else { continue };
        match codec.decode(&bytes) {
            Ok(envelope) => {
                transport.send(envelope).await;
            }
            Err(err) => warn!(%err, "dropping malformed long-poll inbound message"),
        }
    }
    StatusCode::OK.into_response()
}

async fn lp_disconnect(
    State(state): State<Arc<AppState>>,
    Path(_name): Path<String>,
    Query(q): Query<ClientIdQuery>,
) -> Response {
    let Some(client_id) = q.client_id else {
        return ServerError::ClientIdInvalid.to_http_response("missing client_id").into_response();
    };
    if let Some(transport) = state.long_poll_for(&client_id).await {
        transport.close();
    }
    state.remove_long_poll(&client_id).await;
    StatusCode::OK.into_response()
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
