// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Error kinds at the HTTP/transport boundary, per the error-handling table:
/// each maps to a stable code and a propagation rule (close the connection,
/// reply `error` on the offending ref, or answer with an HTTP status).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerError {
    MalformedFrame,
    FieldType,
    UpgradeRejected,
    Unauthorized,
    ClientIdInvalid,
    Closed,
    Full,
    Timeout,
    HandlerPanic,
    CircuitOpen,
    TokenExpired,
    TokenInvalid,
    NoHandler,
    Internal,
}

impl ServerError {
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::MalformedFrame | Self::FieldType | Self::ClientIdInvalid | Self::NoHandler => {
                StatusCode::BAD_REQUEST
            }
            Self::UpgradeRejected => StatusCode::FORBIDDEN,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Closed => StatusCode::GONE,
            Self::Full => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::HandlerPanic | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
            Self::TokenExpired | Self::TokenInvalid => StatusCode::BAD_REQUEST,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedFrame => "MALFORMED_FRAME",
            Self::FieldType => "FIELD_TYPE",
            Self::UpgradeRejected => "UPGRADE_REJECTED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::ClientIdInvalid => "CLIENT_ID_INVALID",
            Self::Closed => "CLOSED",
            Self::Full => "FULL",
            Self::Timeout => "TIMEOUT",
            Self::HandlerPanic => "HANDLER_PANIC",
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenInvalid => "TOKEN_INVALID",
            Self::NoHandler => "NO_HANDLER",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(&self, message: impl Into<String>) -> Response {
        let body = ErrorResponse { error: self.to_error_body(message) };
        (self.http_status(), Json(body)).into_response()
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for ServerError {}

impl From<lumen_core::Error> for ServerError {
    fn from(err: lumen_core::Error) -> Self {
        match err {
            lumen_core::Error::MalformedFrame(_) => Self::MalformedFrame,
            lumen_core::Error::FieldType(_) => Self::FieldType,
            lumen_core::Error::SlotRender { .. } => Self::Internal,
            lumen_core::Error::Full => Self::Full,
            lumen_core::Error::Closed => Self::Closed,
            lumen_core::Error::Timeout => Self::Timeout,
            lumen_core::Error::CircuitOpen => Self::CircuitOpen,
            lumen_core::Error::TokenInvalid => Self::TokenInvalid,
            lumen_core::Error::TokenExpired => Self::TokenExpired,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        self.to_http_response(self.as_str())
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
