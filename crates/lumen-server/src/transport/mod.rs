// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport abstraction over the three wire carriers (WebSocket, SSE,
//! long-poll). Unlike [`crate::component::Component`], this surface is kept
//! as plain methods over a channel handle rather than an `async_trait`
//! object: a transport's send path is a bounded-channel handoff to its
//! dedicated write-loop task, not a call a caller needs to await through a
//! trait object.

pub mod auth;
pub mod long_poll;
pub mod sse;
pub mod ws;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use lumen_core::codec::Envelope;
use lumen_core::{Error, Result};

/// Default bound for a transport's outbound send queue.
pub const DEFAULT_SEND_QUEUE_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Ws,
    Sse,
    LongPoll,
}

/// Once-closeable flag shared between a transport's read, write, and owning
/// tasks so any of them can observe and trigger closure exactly once.
#[derive(Clone, Default)]
pub struct CloseGuard(Arc<AtomicBool>);

impl CloseGuard {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Returns `true` the first time it's called; subsequent calls are a
    /// no-op that also return `false`.
    pub fn close(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}

/// A handle to one connection's outbound path. The write-loop task is the
/// sole reader of `outbound`; this handle is the only way any other task may
/// reach the socket, so no socket-level lock is needed beyond the channel's
/// own bound.
#[derive(Clone)]
pub struct TransportHandle {
    pub kind: TransportKind,
    outbound: mpsc::Sender<Envelope>,
    closed: CloseGuard,
}

impl TransportHandle {
    pub fn new(kind: TransportKind, queue_depth: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        (Self { kind, outbound: tx, closed: CloseGuard::new() }, rx)
    }

    /// Enqueue a message for the write-loop. Fails with `ErrClosed` if the
    /// transport already closed, or `ErrFull` if the send queue is at
    /// capacity (the caller decides whether to drop or retry; unlike
    /// pub/sub fan-out, a single connection's outbound queue backpressures
    /// rather than silently drops).
    pub fn send(&self, message: Envelope) -> Result<()> {
        if self.closed.is_closed() {
            return Err(Error::Closed);
        }
        self.outbound.try_send(message).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => Error::Full,
            mpsc::error::TrySendError::Closed(_) => Error::Closed,
        })
    }

    pub fn close(&self) {
        self.closed.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_closed()
    }

    /// Share this handle's close flag with a transport-specific companion
    /// (e.g. long-poll's [`long_poll::LongPollTransport`]) so both observe
    /// the same connection lifetime without a second round of signaling.
    pub fn closed_guard(&self) -> CloseGuard {
        self.closed.clone()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
