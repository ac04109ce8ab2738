// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport-agnostic runtime for real-time, server-rendered UI components:
//! the wire codec, the assigns/change-tracking bag, the hybrid diff engine,
//! circuit breaker and retry, HMAC recovery tokens, presence, and the hook
//! bus. None of this module depends on any particular transport or web
//! framework; `lumen-server` wires it to axum.

pub mod assigns;
pub mod circuit;
pub mod codec;
pub mod diff;
pub mod error;
pub mod hash;
pub mod hooks;
pub mod presence;
pub mod recovery;

pub use assigns::{Assigns, Value};
pub use circuit::{CircuitBreaker, CircuitConfig, CircuitState, RetryPolicy};
pub use codec::{Codec, CodecConfig, Envelope, WireShape};
pub use error::{Error, Result};
pub use hooks::{HookBus, HookPoint};
pub use presence::{PresenceDiff, PresenceMeta, PresenceRegistry};
pub use recovery::{RecoveryClaims, RecoverySigner};
