// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Error kinds produced by the transport-agnostic runtime (codec, assigns,
/// diff engine, circuit breaker, recovery tokens).
///
/// Mirrors the error-kind table in the design doc: each variant maps to a
/// stable string so callers across the wire boundary can match on it without
/// depending on Rust's `Debug` formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Decode failed: not valid JSON, or wrong tuple arity.
    MalformedFrame(String),
    /// Decode failed: a field had the wrong JSON type (e.g. topic not a string).
    FieldType(String),
    /// A per-slot render callback failed; annotated with the offending slot id.
    SlotRender { slot: String, reason: String },
    /// A bounded queue was full (publish/send backpressure).
    Full,
    /// The channel/transport/subscription was already closed.
    Closed,
    /// A per-handler deadline elapsed.
    Timeout,
    /// The circuit breaker is open; the call was short-circuited.
    CircuitOpen,
    /// A recovery token failed signature or freshness verification.
    TokenInvalid,
    /// A recovery token was well-formed and signed but has expired.
    TokenExpired,
}

impl Error {
    /// Stable machine-readable code, independent of the `Display` message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedFrame(_) => "MALFORMED_FRAME",
            Self::FieldType(_) => "FIELD_TYPE",
            Self::SlotRender { .. } => "SLOT_RENDER",
            Self::Full => "FULL",
            Self::Closed => "CLOSED",
            Self::Timeout => "TIMEOUT",
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::TokenInvalid => "TOKEN_INVALID",
            Self::TokenExpired => "TOKEN_EXPIRED",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedFrame(reason) => write!(f, "malformed frame: {reason}"),
            Self::FieldType(reason) => write!(f, "field type error: {reason}"),
            Self::SlotRender { slot, reason } => write!(f, "slot {slot} render failed: {reason}"),
            Self::Full => f.write_str("queue full"),
            Self::Closed => f.write_str("closed"),
            Self::Timeout => f.write_str("timeout"),
            Self::CircuitOpen => f.write_str("circuit open"),
            Self::TokenInvalid => f.write_str("recovery token invalid"),
            Self::TokenExpired => f.write_str("recovery token expired"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
