use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use geoalert_common::CoordinateError;
use serde::Serialize;
use utoipa::ToSchema;

/// Structured error body returned to HTTP producers.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The message was not one of the recognised shapes.
    InvalidFormat,
    /// A recognised message carried missing or out-of-range fields.
    Validation,
    /// The location index or claim store could not be reached.
    StoreUnavailable,
    /// The submission did not finish within the configured deadline.
    Timeout,
}

/// Engine-level error. Every failed submission maps to exactly one of these.
#[derive(Debug, Clone)]
pub struct AlertError {
    pub kind: ErrorKind,
    pub message: String,
}

impl AlertError {
    pub fn invalid_format() -> Self {
        Self {
            kind: ErrorKind::InvalidFormat,
            message: "invalid message format".to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Validation,
            message: message.into(),
        }
    }

    pub fn store_unavailable() -> Self {
        Self {
            kind: ErrorKind::StoreUnavailable,
            message: "alert store unavailable".to_string(),
        }
    }

    pub fn timeout() -> Self {
        Self {
            kind: ErrorKind::Timeout,
            message: "alert submission timed out".to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::InvalidFormat | ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn code(&self) -> &'static str {
        match self.kind {
            ErrorKind::InvalidFormat => "INVALID_FORMAT",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::StoreUnavailable => "STORE_UNAVAILABLE",
            ErrorKind::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for AlertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for AlertError {}

impl IntoResponse for AlertError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.message.clone(),
            },
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<CoordinateError> for AlertError {
    fn from(err: CoordinateError) -> Self {
        Self::validation(err.to_string())
    }
}

impl From<redis::RedisError> for AlertError {
    fn from(err: redis::RedisError) -> Self {
        tracing::error!(?err, "redis error");
        Self::store_unavailable()
    }
}
