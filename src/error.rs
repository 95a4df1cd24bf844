// src/error.rs
// Error types for the search/indexing core.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Core error kinds, matching the classification in the design notes: every
/// failure that can surface from an embedding call, an index call, the outbox
/// store, or request validation funnels into one of these variants.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Network/timeout/rate-limit/5xx from an embedding or index dependency.
    /// Always retryable by the worker; always masked to an opaque 5xx by the
    /// search service.
    #[error("transient: {0}")]
    Transient(String),

    /// The index already reflects the desired state ("already exists" /
    /// `422`). Treated as success by callers that check for it explicitly.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unknown outbox op, or a dimension mismatch that survived retries.
    /// Never retried; the job is marked dead.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// `true` for index/embedding errors whose message matches the upstream
    /// "already in the desired state" convention. Case-sensitive and
    /// string-based on purpose, to match upstream messages exactly.
    pub fn is_already_exists(message: &str) -> bool {
        message.contains("already exists") || message.contains("status code: 422")
    }
}

/// Result alias used throughout the core.
pub type CoreResult<T> = Result<T, CoreError>;

/// Extension trait for wrapping foreign errors (sqlx, reqwest, qdrant-client)
/// with a `CoreError` classification and context, mirroring
/// `IntoGitErrorResult` in the teacher crate.
pub trait IntoCoreError<T> {
    fn transient_context(self, context: &str) -> CoreResult<T>;
    fn permanent_context(self, context: &str) -> CoreResult<T>;
}

impl<T, E: std::fmt::Display> IntoCoreError<T> for Result<T, E> {
    fn transient_context(self, context: &str) -> CoreResult<T> {
        self.map_err(|e| CoreError::Transient(format!("{context}: {e}")))
    }

    fn permanent_context(self, context: &str) -> CoreResult<T> {
        self.map_err(|e| CoreError::Permanent(format!("{context}: {e}")))
    }
}

/// HTTP mapping for the search endpoint: `Validation`/`Unauthorized` surface
/// verbatim. `Transient`/`Conflict`/`Permanent` always map to a 5xx, but keep
/// the message the caller already constructed (e.g. "embedding service
/// unavailable") rather than overwriting it, since those messages are
/// themselves the opaque, stage-specific text callers are meant to see.
impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            CoreError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            CoreError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            CoreError::Transient(msg) | CoreError::Conflict(msg) | CoreError::Permanent(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
