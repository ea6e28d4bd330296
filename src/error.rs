//! Error types with HTTP status code mapping.
//!
//! [`HubError`] covers everything the webhook sender can observe. Failures
//! local to one subscriber ([`DeliveryFault`]) or to the external relay
//! ([`RelayError`]) are contained inside the hub and never reach the
//! request path.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::SubscriberId;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "webhook authentication failed: body digest mismatch"
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
}

/// Request-path errors with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category   | HTTP Status     |
/// |-----------|------------|-----------------|
/// | 1000–1999 | Admission  | 403 Forbidden   |
/// | 2000–2999 | Auth       | 400 Bad Request |
/// | 3000–3999 | Decode     | 400 Bad Request |
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The request did not come from a trusted origin.
    #[error("untrusted origin")]
    Admission {
        /// Peer address as seen by the server.
        remote_addr: String,
        /// `X-Forwarded-For` value, if any.
        forwarded_for: Option<String>,
    },

    /// The authenticity proof is missing or invalid.
    #[error("webhook authentication failed: {0}")]
    Auth(String),

    /// The verified body is not a valid event payload.
    #[error("malformed webhook payload: {0}")]
    Decode(String),
}

impl HubError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Admission { .. } => 1001,
            Self::Auth(_) => 2001,
            Self::Decode(_) => 3001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Admission { .. } => StatusCode::FORBIDDEN,
            Self::Auth(_) | Self::Decode(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
            },
        };
        (status, axum::Json(body)).into_response()
    }
}

/// Why a subscriber was dropped during fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryFault {
    /// The subscriber's queue was full; it is not keeping up.
    #[error("subscriber {0} queue full")]
    QueueFull(SubscriberId),

    /// The subscriber's session already ended.
    #[error("subscriber {0} disconnected")]
    Disconnected(SubscriberId),
}

impl DeliveryFault {
    /// Returns the affected subscriber.
    #[must_use]
    pub const fn subscriber(&self) -> SubscriberId {
        match self {
            Self::QueueFull(id) | Self::Disconnected(id) => *id,
        }
    }
}

/// External relay failures. Logged, never retried.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The Redis client reported an error.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A sink operation did not finish in time.
    #[error("{operation} timed out after {after_ms} ms")]
    Timeout {
        /// Operation that timed out.
        operation: &'static str,
        /// Configured limit in milliseconds.
        after_ms: u64,
    },

    /// The event could not be serialized.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The forwarder is behind; the event was dropped.
    #[error("relay queue full")]
    QueueFull,

    /// The forwarder task has stopped.
    #[error("relay stopped")]
    Closed,

    /// The sink rejected the message.
    #[error("sink rejected message: {0}")]
    Rejected(String),
}
