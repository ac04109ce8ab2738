// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A small process-wide pool of reusable output buffers, so a render tick's
//! wire-encode step doesn't allocate a fresh `Vec<u8>` on every message.
//! Grounded in the same "shared-resource policy" the spec calls for
//! (§5: "Output buffers are drawn from a process-wide pool to cap
//! allocation rate"), implemented the way the teacher pools its terminal
//! grid snapshots — a `Mutex<Vec<T>>` freelist, not a full allocator.

// The pool's critical sections never panic, so poisoning can't happen in
// practice; `expect` documents that rather than threading a fallback path.
#![allow(clippy::expect_used)]

use std::sync::Mutex;

/// Caps how many idle buffers the pool holds onto; beyond this, a returned
/// buffer is simply dropped instead of stored; this bounds steady-state
/// memory at `cap * buffer-capacity` rather than the high-water mark.
const DEFAULT_CAP: usize = 256;

pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    cap: usize,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAP)
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self { free: Mutex::new(Vec::new()), cap }
    }

    /// Borrow a buffer, empty but possibly with spare capacity from a prior
    /// use. Returned to the pool automatically when the guard drops.
    pub fn acquire(&self) -> PooledBuf<'_> {
        let buf = self.free.lock().expect("buffer pool mutex poisoned").pop().unwrap_or_default();
        PooledBuf { buf: Some(buf), pool: self }
    }

    fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        let mut free = self.free.lock().expect("buffer pool mutex poisoned");
        if free.len() < self.cap {
            free.push(buf);
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// A pooled `Vec<u8>` that returns itself to the pool on drop.
pub struct PooledBuf<'a> {
    buf: Option<Vec<u8>>,
    pool: &'a BufferPool,
}

impl std::ops::Deref for PooledBuf<'_> {
    type Target = Vec<u8>;
    fn deref(&self) -> &Vec<u8> {
        self.buf.as_ref().expect("buffer taken before drop")
    }
}

impl std::ops::DerefMut for PooledBuf<'_> {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        self.buf.as_mut().expect("buffer taken before drop")
    }
}

impl Drop for PooledBuf<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}
