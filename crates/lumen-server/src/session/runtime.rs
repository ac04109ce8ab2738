// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session message loop: the task that owns one connection's life from
//! `phx_join` through termination. Reads decoded envelopes (and, separately,
//! out-of-band pub/sub deliveries addressed to this session, plus presence
//! fan-out for its topic) strictly in arrival order, dispatches reserved
//! events inline, and routes everything else through the component's
//! `handle_event`/`handle_info` followed by the render-and-diff path.
//!
//! Inbound envelopes pass through a connection-level [`Dispatcher`] gate
//! before reaching this loop at all — middleware (rate limiting) and panic
//! recovery happen there, per §4.H; this loop still owns the actual
//! reserved-event and component routing described in §4.F.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::{json, Value as Json};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use lumen_core::codec::Envelope;
use lumen_core::diff::{compute_diff, extract_slots, DiffPayload, RenderInput};
use lumen_core::hooks::HookPoint;
use lumen_core::presence::{diff_to_wire, PresenceRegistry};
use lumen_core::{Error as CoreError, HookBus};

use crate::component::{Component, MountContext, TerminateReason};
use crate::config::TimeoutTable;
use crate::dispatcher::Dispatcher;
use crate::error::ServerError;
use crate::pubsub::InProcessPubSub;
use crate::recovery::RecoveryStore;
use crate::session::manager::SessionManager;
use crate::session::Session;
use crate::transport::TransportHandle;

/// Everything the message loop needs beyond the session itself: shared
/// process-wide collaborators, injected rather than reached through global
/// state (per the spec's Design Notes "Global state. Minimize.").
pub struct RuntimeDeps {
    pub manager: Arc<SessionManager>,
    pub pubsub: Arc<InProcessPubSub>,
    pub hooks: Arc<HookBus>,
    pub recovery: Arc<RecoveryStore>,
    pub presence: Arc<PresenceRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub timeouts: TimeoutTable,
}

/// Derive a topic's presence-fanout channel name, kept distinct from the
/// topic itself (application messages) and from the per-socket info topic.
fn presence_topic(topic: &str) -> String {
    format!("{topic}:presence")
}

/// Spawn a session's message loop. `info_queue_depth` bounds the
/// subscription channels that carry out-of-band pub/sub deliveries (info
/// messages, presence diffs) into this session, and the connection gate
/// between the transport's raw inbound channel and the loop itself.
pub async fn spawn(
    session: Arc<Session>,
    inbound_rx: mpsc::Receiver<Envelope>,
    mount_ctx: MountContext,
    deps: Arc<RuntimeDeps>,
    info_queue_depth: usize,
) {
    let info_topic = format!("lv:{}", session.socket_id);
    let (info_tx, info_rx) = mpsc::channel::<Json>(info_queue_depth.max(1));
    let info_subscription = deps
        .pubsub
        .subscribe(info_topic, info_queue_depth.max(1), move |message| {
            let _ = info_tx.try_send(message);
        })
        .await
        .ok();

    let (presence_tx, presence_rx) = mpsc::channel::<Json>(info_queue_depth.max(1));
    let presence_subscription = deps
        .pubsub
        .subscribe(presence_topic(&session.topic), info_queue_depth.max(1), move |message| {
            let _ = presence_tx.try_send(message);
        })
        .await
        .ok();

    let gated_rx = gate_inbound(inbound_rx, session.transport.clone(), deps.clone(), info_queue_depth);

    tokio::spawn(async move {
        run_loop(session.clone(), gated_rx, info_rx, presence_rx, mount_ctx, deps).await;
        if let Some(handle) = info_subscription {
            handle.unsubscribe().await;
        }
        if let Some(handle) = presence_subscription {
            handle.unsubscribe().await;
        }
    });
}

/// Interpose the shared connection dispatcher between the transport's raw
/// inbound channel and the message loop: every envelope passes through the
/// dispatcher's middleware chain (rate limiting) and panic-recovery boundary
/// before the loop ever sees it. A middleware rejection is answered with an
/// error reply directly on the transport, since the loop never gets the
/// envelope to reply from.
fn gate_inbound(
    mut inbound_rx: mpsc::Receiver<Envelope>,
    transport: TransportHandle,
    deps: Arc<RuntimeDeps>,
    queue_depth: usize,
) -> mpsc::Receiver<Envelope> {
    let (gated_tx, gated_rx) = mpsc::channel(queue_depth.max(1));
    tokio::spawn(async move {
        while let Some(envelope) = inbound_rx.recv().await {
            let source = envelope.clone();
            match deps.dispatcher.dispatch(envelope).await {
                Ok(envelope) => {
                    if gated_tx.send(envelope).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    debug!(%err, "connection gate rejected envelope");
                    let reply = reply_envelope(&source, "error", json!({"reason": err.as_str()}));
                    let _ = transport.send(reply);
                }
            }
        }
    });
    gated_rx
}

async fn run_loop(
    session: Arc<Session>,
    mut inbound_rx: mpsc::Receiver<Envelope>,
    mut info_rx: mpsc::Receiver<Json>,
    mut presence_rx: mpsc::Receiver<Json>,
    mount_ctx: MountContext,
    deps: Arc<RuntimeDeps>,
) {
    deps.hooks.fire(HookPoint::Connect).await;

    loop {
        tokio::select! {
            biased;
            _ = session.cancel.cancelled() => {
                let reason =
                    if session.is_timeout_evicted() { TerminateReason::Timeout } else { TerminateReason::Shutdown };
                let _ = terminate(&session, &deps, reason).await;
                break;
            }
            maybe_envelope = inbound_rx.recv() => {
                match maybe_envelope {
                    Some(envelope) => {
                        session.touch();
                        if handle_envelope(&session, &mount_ctx, &deps, envelope).await {
                            break;
                        }
                    }
                    None => {
                        // Transport's read side ended without an explicit
                        // phx_leave: treat as an ordinary client departure.
                        let _ = terminate(&session, &deps, TerminateReason::Normal).await;
                        break;
                    }
                }
            }
            maybe_presence = presence_rx.recv() => {
                let Some(wire) = maybe_presence else { continue };
                let envelope = Envelope::new(session.topic.clone(), "presence_diff").with_payload(wire);
                if let Err(err) = session.transport.send(envelope) {
                    debug!(%err, session_id = %session.id, "dropping presence_diff: transport unavailable");
                }
            }
            maybe_info = info_rx.recv() => {
                let Some(message) = maybe_info else { continue };
                handle_info(&session, &deps, message).await;
            }
        }
    }

    deps.manager.remove(&session.id).await;
    session.transport.close();
    deps.hooks.fire(HookPoint::Disconnect).await;
}

/// Dispatch one inbound envelope. Returns `true` if the loop should stop
/// (the session left or its transport closed under it).
async fn handle_envelope(
    session: &Arc<Session>,
    mount_ctx: &MountContext,
    deps: &Arc<RuntimeDeps>,
    envelope: Envelope,
) -> bool {
    match envelope.event.as_str() {
        "phx_heartbeat" | "heartbeat" => {
            let reply = reply_envelope(&envelope, "ok", Json::Null);
            let _ = session.transport.send(reply);
            false
        }
        "phx_join" => {
            handle_join(session, mount_ctx, deps, envelope).await
        }
        "phx_leave" => {
            let token = terminate(session, deps, TerminateReason::Normal).await;
            let response = match token {
                Some(token) => json!({"token": token}),
                None => json!({}),
            };
            let reply = reply_envelope(&envelope, "ok", response);
            let _ = session.transport.send(reply);
            true
        }
        _ => {
            handle_app_event(session, deps, envelope).await;
            false
        }
    }
}

async fn handle_join(
    session: &Arc<Session>,
    mount_ctx: &MountContext,
    deps: &Arc<RuntimeDeps>,
    envelope: Envelope,
) -> bool {
    if let Some(join_ref) = &envelope.r#ref {
        *session.join_ref.lock().await = Some(join_ref.clone());
    }

    if !session.mounted.load(Ordering::Acquire) {
        let mut recovered = false;
        if let Some(token) = envelope.payload.as_ref().and_then(|p| p.get("token")).and_then(|v| v.as_str()) {
            match deps.recovery.redeem(token).await {
                Ok(stored) => {
                    let mut component = session.component.lock().await;
                    component.restore_assigns(stored.assigns).await;
                    drop(component);
                    session.diff_state.lock().await.set_version(stored.state_version);
                    deps.hooks.fire(HookPoint::Reconnect).await;
                    recovered = true;
                }
                Err(err) => debug!(%err, session_id = %session.id, "recovery token redeem failed"),
            }
        }

        // A recovered session restores its assigns from the snapshot and
        // skips the user `mount` hook entirely (spec.md §4.J: "the new
        // session mounts without calling the user mount function").
        let mount_result = if recovered {
            Ok(Ok(()))
        } else {
            deps.hooks.fire(HookPoint::BeforeMount).await;
            let mut component = session.component.lock().await;
            tokio::time::timeout(deps.timeouts.mount, component.mount(mount_ctx)).await
        };

        match mount_result {
            Ok(Ok(())) => {
                session.mounted.store(true, Ordering::Release);
                if !recovered {
                    deps.hooks.fire(HookPoint::AfterMount).await;
                }
                announce_presence(session, deps).await;
            }
            Ok(Err(err)) => {
                deps.hooks.fire(HookPoint::Error).await;
                let reply = reply_envelope(&envelope, "error", json!({"reason": err.to_string()}));
                let _ = session.transport.send(reply);
                let _ = terminate(session, deps, TerminateReason::Error).await;
                return true;
            }
            Err(_elapsed) => {
                deps.hooks.fire(HookPoint::Error).await;
                let reply =
                    reply_envelope(&envelope, "error", json!({"reason": ServerError::Timeout.as_str()}));
                let _ = session.transport.send(reply);
                let _ = terminate(session, deps, TerminateReason::Timeout).await;
                return true;
            }
        }
    }

    let rendered = {
        let component = session.component.lock().await;
        tokio::time::timeout(deps.timeouts.render, component.render()).await
    };

    match rendered {
        Ok(Ok(html)) => {
            let reply = reply_envelope(&envelope, "ok", json!({"rendered": {"s": [html]}}));
            let _ = session.transport.send(reply);
            false
        }
        Ok(Err(err)) => {
            let reply = reply_envelope(&envelope, "error", json!({"reason": err.to_string()}));
            let _ = session.transport.send(reply);
            false
        }
        Err(_elapsed) => {
            let reply =
                reply_envelope(&envelope, "error", json!({"reason": ServerError::Timeout.as_str()}));
            let _ = session.transport.send(reply);
            false
        }
    }
}

/// Track this session in its topic's presence set and fan out the join diff
/// to every other member (this session receives it too, via its own
/// presence subscription, since `spawn` subscribes before `phx_join` can
/// possibly be processed).
async fn announce_presence(session: &Arc<Session>, deps: &Arc<RuntimeDeps>) {
    let diff = deps.presence.track(&session.topic, &session.id, json!({})).await;
    if diff.is_empty() {
        return;
    }
    let wire = diff_to_wire(&diff);
    if let Err(err) = deps.pubsub.publish(&presence_topic(&session.topic), wire).await {
        debug!(%err, session_id = %session.id, "presence join fan-out failed");
    }
}

async fn handle_app_event(session: &Arc<Session>, deps: &Arc<RuntimeDeps>, envelope: Envelope) {
    if !session.mounted.load(Ordering::Acquire) {
        let reply = reply_envelope(
            &envelope,
            "error",
            json!({"reason": "component not mounted; send phx_join first"}),
        );
        let _ = session.transport.send(reply);
        return;
    }

    deps.hooks.fire(HookPoint::BeforeEvent).await;

    let outcome = {
        let mut component = session.component.lock().await;
        let event = envelope.event.clone();
        let payload = envelope.payload.clone();
        tokio::time::timeout(
            deps.timeouts.event,
            session.handler_circuit.call(|| component.handle_event(&event, payload.as_ref())),
        )
        .await
    };

    deps.hooks.fire(HookPoint::AfterEvent).await;

    match outcome {
        Ok(Ok(())) => {
            let reply = reply_envelope(&envelope, "ok", json!({}));
            let _ = session.transport.send(reply);
            emit_diff_if_any(session, deps).await;
        }
        Ok(Err(err)) => {
            deps.hooks.fire(HookPoint::Error).await;
            let reply = reply_envelope(&envelope, "error", json!({"reason": err.to_string()}));
            let _ = session.transport.send(reply);
        }
        Err(_elapsed) => {
            deps.hooks.fire(HookPoint::Error).await;
            let reply =
                reply_envelope(&envelope, "error", json!({"reason": ServerError::Timeout.as_str()}));
            let _ = session.transport.send(reply);
        }
    }
}

async fn handle_info(session: &Arc<Session>, deps: &Arc<RuntimeDeps>, message: Json) {
    if !session.mounted.load(Ordering::Acquire) {
        return;
    }

    let outcome = {
        let mut component = session.component.lock().await;
        tokio::time::timeout(
            deps.timeouts.event,
            session.handler_circuit.call(|| component.handle_info(&message)),
        )
        .await
    };

    match outcome {
        Ok(Ok(())) => emit_diff_if_any(session, deps).await,
        Ok(Err(err)) => warn!(%err, session_id = %session.id, "handle_info failed"),
        Err(_elapsed) => warn!(session_id = %session.id, "handle_info timed out"),
    }
}

/// Render the component, compute the diff against the session's baseline,
/// and push a `diff` event if the payload is non-empty. A per-slot render
/// failure (surfaced as `CoreError::SlotRender`) falls back to a full
/// render on the *next* tick rather than aborting this one; the spec treats
/// this tick's abort as fatal only to the diff, not to the session.
async fn emit_diff_if_any(session: &Arc<Session>, deps: &Arc<RuntimeDeps>) {
    deps.hooks.fire(HookPoint::BeforeRender).await;

    let mut component = session.component.lock().await;
    let rendered = tokio::time::timeout(deps.timeouts.render, component.render()).await;
    let html = match rendered {
        Ok(Ok(html)) => html,
        Ok(Err(err)) => {
            warn!(%err, session_id = %session.id, "render failed");
            return;
        }
        Err(_elapsed) => {
            warn!(session_id = %session.id, "render timed out");
            return;
        }
    };

    let changed = component.changed_fields().await;
    let mut lists = HashMap::new();
    if let Some(list_provider) = component.as_list_provider() {
        for list_id in list_provider.list_ids() {
            let items = list_provider.list_items(&list_id);
            lists.insert(list_id, items);
        }
    }

    let payload_result = {
        let mut diff_state = session.diff_state.lock().await;
        if let Some(template_provider) = component.as_template_provider() {
            let extracted: HashMap<String, String> =
                extract_slots(&html).into_iter().map(|slot| (slot.id, slot.content)).collect();
            let render_slot = |id: &str| -> lumen_core::Result<String> {
                extracted.get(id).cloned().ok_or_else(|| CoreError::SlotRender {
                    slot: id.to_owned(),
                    reason: "slot absent from rendered output".to_owned(),
                })
            };
            compute_diff(
                &mut diff_state,
                &changed,
                RenderInput::Template { ast: template_provider.compiled_template(), render_slot: &render_slot },
                &lists,
            )
        } else {
            compute_diff(&mut diff_state, &changed, RenderInput::ExtractHtml(&html), &lists)
        }
    };
    drop(component);

    deps.hooks.fire(HookPoint::AfterRender).await;

    match payload_result {
        Ok(Some(payload)) => send_diff(session, payload),
        Ok(None) => {}
        Err(err) => warn!(%err, session_id = %session.id, "diff computation failed"),
    }
}

fn send_diff(session: &Session, payload: DiffPayload) {
    let Ok(json) = serde_json::to_value(&payload) else {
        warn!(session_id = %session.id, "diff payload failed to serialize");
        return;
    };
    let envelope = Envelope::new(session.topic.clone(), "diff").with_payload(json);
    if let Err(err) = session.transport.send(envelope) {
        debug!(%err, session_id = %session.id, "dropping diff: transport unavailable");
    }
}

/// Drive a session's termination: call the component's `terminate` hook,
/// cancel derived operations, fan out a presence leave if it ever joined,
/// and — on a clean `Normal` disconnect — save a recovery token the client
/// can use to resume. Idempotent with respect to repeated calls in spirit,
/// though the loop only ever calls this once per session.
async fn terminate(session: &Arc<Session>, deps: &Arc<RuntimeDeps>, reason: TerminateReason) -> Option<String> {
    session.cancel.cancel();

    if session.mounted.load(Ordering::Acquire) {
        let leave = deps.presence.untrack(&session.topic, &session.id).await;
        if !leave.is_empty() {
            let wire = diff_to_wire(&leave);
            let _ = deps.pubsub.publish(&presence_topic(&session.topic), wire).await;
        }
    }

    let token = if reason == TerminateReason::Normal {
        let component = session.component.lock().await;
        let name = component.name().to_owned();
        let snapshot = component.assigns_snapshot().await;
        let version = session.diff_state.lock().await.version();
        drop(component);
        Some(deps.recovery.save(&session.socket_id, &name, snapshot, version).await)
    } else {
        None
    };

    let mut component = session.component.lock().await;
    component.terminate(reason).await;
    info!(session_id = %session.id, reason = ?reason, "session terminated");
    token
}

fn reply_envelope(source: &Envelope, status: &str, response: Json) -> Envelope {
    let mut envelope = Envelope::new(source.topic.clone(), "phx_reply");
    envelope.r#ref = source.r#ref.clone();
    envelope.join_ref = source.join_ref.clone();
    envelope.payload = Some(json!({"status": status, "response": response}));
    envelope
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
