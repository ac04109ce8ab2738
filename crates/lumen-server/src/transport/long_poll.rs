// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fallback-of-last-resort transport: HTTP long-polling for clients that
//! can't hold a socket or an SSE stream open at all. A connect call mints a
//! signed client id (`transport::auth::LongPollClientId`); `poll` blocks the
//! request until there's something to deliver, the poll is cancelled, or the
//! session closes; `send` is a plain request/response drop-off for inbound
//! messages. Outbound envelopes pass through the same bounded
//! [`TransportHandle`] every other transport uses, then get buffered here in
//! a second queue sized to the spec's own cap rather than the channel's —
//! long-poll clients can go quiet for the length of a poll interval, so the
//! buffer needs room to accumulate past what a live socket would ever queue.

// The pending queue's critical sections never panic, so poisoning can't
// happen in practice; `expect` documents that rather than threading a
// fallback path.
#![allow(clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use lumen_core::codec::Envelope;

use crate::transport::{CloseGuard, TransportHandle, TransportKind, DEFAULT_SEND_QUEUE_DEPTH};

/// Default cap on the pending-outbound queue before oldest entries are
/// dropped to make room.
pub const DEFAULT_QUEUE_CAP: usize = 1000;

#[derive(Debug, Clone)]
pub struct LongPollConfig {
    pub queue_cap: usize,
    pub send_queue_depth: usize,
    pub poll_timeout: Duration,
}

impl Default for LongPollConfig {
    fn default() -> Self {
        Self {
            queue_cap: DEFAULT_QUEUE_CAP,
            send_queue_depth: DEFAULT_SEND_QUEUE_DEPTH,
            poll_timeout: Duration::from_secs(25),
        }
    }
}

struct Pending {
    queue: Mutex<VecDeque<Envelope>>,
    cap: usize,
    notify: Notify,
}

impl Pending {
    fn push(&self, envelope: Envelope) {
        let mut queue = self.queue.lock().expect("pending queue mutex poisoned");
        queue.push_back(envelope);
        if queue.len() > self.cap {
            let drop_count = (self.cap / 10).max(1);
            for _ in 0..drop_count.min(queue.len()) {
                queue.pop_front();
            }
        }
        drop(queue);
        self.notify.notify_one();
    }

    fn drain(&self) -> Vec<Envelope> {
        let mut queue = self.queue.lock().expect("pending queue mutex poisoned");
        queue.drain(..).collect()
    }
}

/// A long-poll connection's server-side state. Cheaply cloneable; every
/// poll/send HTTP request looks one up by client id and operates on the
/// shared handle.
#[derive(Clone)]
pub struct LongPollTransport {
    pending: std::sync::Arc<Pending>,
    closed: CloseGuard,
    inbound: tokio::sync::mpsc::Sender<Envelope>,
}

impl LongPollTransport {
    /// Open a transport: returns the generic session-facing handle, the
    /// long-poll-specific state the HTTP layer polls/sends against, and the
    /// inbound receiver the session's message loop reads from.
    pub fn open(config: LongPollConfig) -> (TransportHandle, Self, tokio::sync::mpsc::Receiver<Envelope>) {
        let (handle, mut outbound_rx) = TransportHandle::new(TransportKind::LongPoll, config.send_queue_depth);
        let (inbound_tx, inbound_rx) = tokio::sync::mpsc::channel(config.send_queue_depth);
        let pending = std::sync::Arc::new(Pending {
            queue: Mutex::new(VecDeque::new()),
            cap: config.queue_cap.max(1),
            notify: Notify::new(),
        });

        let transport = Self { pending: pending.clone(), closed: handle.closed_guard(), inbound: inbound_tx };

        tokio::spawn(async move {
            while let Some(envelope) = outbound_rx.recv().await {
                pending.push(envelope);
            }
        });

        (handle, transport, inbound_rx)
    }

    /// Hand an inbound envelope (decoded from a `send` POST body) to the
    /// session's message loop. Fails silently with `false` if the session
    /// already closed — the HTTP handler treats that as "connection gone".
    pub async fn send(&self, envelope: Envelope) -> bool {
        self.inbound.send(envelope).await.is_ok()
    }

    /// Block until there's something to deliver, the cancellation token
    /// fires, or the transport closes — whichever comes first. An empty
    /// `Vec` means "nothing to deliver, try again" for the first two cases;
    /// callers distinguish "closed" via [`Self::is_closed`] if they need to
    /// stop polling for good.
    pub async fn poll(&self, cancel: &CancellationToken, timeout: Duration) -> Vec<Envelope> {
        let existing = self.pending.drain();
        if !existing.is_empty() {
            return existing;
        }
        if self.closed.is_closed() {
            return Vec::new();
        }

        tokio::select! {
            _ = cancel.cancelled() => Vec::new(),
            _ = self.pending.notify.notified() => self.pending.drain(),
            _ = tokio::time::sleep(timeout) => Vec::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_closed()
    }

    pub fn close(&self) {
        self.closed.close();
        self.pending.notify.notify_waiters();
    }
}

#[cfg(test)]
#[path = "long_poll_tests.rs"]
mod tests;
