//! Error types and OData JSON error bodies.
//!
//! Handlers fail with [`HandlerError`]; every failure that reaches a client
//! is rendered as an [`ApiError`] in the OData JSON error format:
//!
//! ```json
//! {"error": {"code": "entity_not_found", "message": "..."}}
//! ```

use bytes::Bytes;
use http::StatusCode;
use odata_domain::DomainError;
use odata_storage::StorageError;
use serde::{Deserialize, Serialize};
use tracing::error;

/// Error codes carried in the `error.code` member of error bodies.
///
/// Each code maps to one HTTP status via [`ApiError::status`].
///
/// ## 400 Bad Request
/// - [`INVALID_PATH`] - The resource path could not be parsed or is not a valid combination
/// - [`VALIDATION_ERROR`] - Payload or query option validation failure
/// - [`INVALID_BATCH`] - Malformed batch envelope or batch part
///
/// ## 403 / 404 / 405 / 409 / 413 / 424
/// - [`FORBIDDEN`] - Rejected by the pre-request hook
/// - [`ENTITY_SET_NOT_FOUND`], [`ENTITY_NOT_FOUND`], [`PROPERTY_NOT_FOUND`], [`RESERVED_PATH`]
/// - [`METHOD_NOT_ALLOWED`] - The resource does not support the request method
/// - [`CONFLICT`] - Duplicate key or concurrent write
/// - [`PAYLOAD_TOO_LARGE`] - Request body exceeds the configured limit
/// - [`CHANGESET_ROLLED_BACK`], [`CHANGESET_ABORTED`] - Effects of a failed changeset
///
/// ## 5xx
/// - [`INTERNAL_ERROR`], [`NOT_IMPLEMENTED`], [`SERVICE_UNAVAILABLE`], [`TIMEOUT`]
pub mod error_codes {
    pub const INVALID_PATH: &str = "invalid_path";
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const INVALID_BATCH: &str = "invalid_batch";

    pub const FORBIDDEN: &str = "forbidden";

    pub const ENTITY_SET_NOT_FOUND: &str = "entity_set_not_found";
    pub const ENTITY_NOT_FOUND: &str = "entity_not_found";
    pub const PROPERTY_NOT_FOUND: &str = "property_not_found";
    /// `$metadata` or `$batch` addressed from inside a batch.
    pub const RESERVED_PATH: &str = "reserved_path";

    pub const METHOD_NOT_ALLOWED: &str = "method_not_allowed";
    pub const CONFLICT: &str = "conflict";
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";

    /// The request executed, but its changeset was rolled back afterwards.
    pub const CHANGESET_ROLLED_BACK: &str = "changeset_rolled_back";
    /// The request was never executed because an earlier member of its changeset failed.
    pub const CHANGESET_ABORTED: &str = "changeset_aborted";

    pub const INTERNAL_ERROR: &str = "internal_error";
    pub const NOT_IMPLEMENTED: &str = "not_implemented";
    pub const SERVICE_UNAVAILABLE: &str = "service_unavailable";
    pub const TIMEOUT: &str = "timeout";
}

/// A client-facing error: code plus human readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

#[derive(Serialize, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a validation error (400).
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::VALIDATION_ERROR, message)
    }

    /// Creates an invalid batch error (400).
    pub fn invalid_batch(message: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_BATCH, message)
    }

    /// Creates an entity not found error (404).
    pub fn entity_not_found(message: impl Into<String>) -> Self {
        Self::new(error_codes::ENTITY_NOT_FOUND, message)
    }

    /// Creates a method not allowed error (405).
    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(error_codes::METHOD_NOT_ALLOWED, message)
    }

    /// Creates a conflict error (409).
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(error_codes::CONFLICT, message)
    }

    /// Creates an internal error (500).
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::INTERNAL_ERROR, message)
    }

    /// Creates a not implemented error (501).
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(error_codes::NOT_IMPLEMENTED, message)
    }

    /// Creates a service unavailable error (503).
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(error_codes::SERVICE_UNAVAILABLE, message)
    }

    /// HTTP status for this error's code.
    pub fn status(&self) -> StatusCode {
        use error_codes::*;

        match self.code.as_str() {
            INVALID_PATH | VALIDATION_ERROR | INVALID_BATCH => StatusCode::BAD_REQUEST,
            FORBIDDEN => StatusCode::FORBIDDEN,
            ENTITY_SET_NOT_FOUND | ENTITY_NOT_FOUND | PROPERTY_NOT_FOUND | RESERVED_PATH => {
                StatusCode::NOT_FOUND
            }
            METHOD_NOT_ALLOWED => StatusCode::METHOD_NOT_ALLOWED,
            CONFLICT => StatusCode::CONFLICT,
            PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            CHANGESET_ROLLED_BACK | CHANGESET_ABORTED => StatusCode::FAILED_DEPENDENCY,
            NOT_IMPLEMENTED => StatusCode::NOT_IMPLEMENTED,
            SERVICE_UNAVAILABLE => StatusCode::SERVICE_UNAVAILABLE,
            TIMEOUT => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Serializes the OData JSON error body.
    pub fn to_body(&self) -> Bytes {
        let envelope = ErrorEnvelope {
            error: self.clone(),
        };
        match serde_json::to_vec(&envelope) {
            Ok(body) => Bytes::from(body),
            Err(_) => Bytes::from_static(
                br#"{"error":{"code":"internal_error","message":"error serialization failed"}}"#,
            ),
        }
    }

    /// Parses an OData JSON error body.
    pub fn from_body(body: &[u8]) -> Option<Self> {
        serde_json::from_slice::<ErrorEnvelope>(body)
            .ok()
            .map(|envelope| envelope.error)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::EntitySetNotFound { .. } => {
                ApiError::new(error_codes::ENTITY_SET_NOT_FOUND, err.to_string())
            }
            StorageError::EntityNotFound { .. } => ApiError::entity_not_found(err.to_string()),
            StorageError::DuplicateEntity { .. } | StorageError::WriteConflict { .. } => {
                ApiError::conflict(err.to_string())
            }
            StorageError::InvalidInput { message } => ApiError::validation_error(message),
            StorageError::HealthCheckFailed { .. } => {
                error!("Storage unavailable: {}", err);
                ApiError::service_unavailable("storage backend unavailable")
            }
            _ => {
                error!("Storage error: {}", err);
                ApiError::internal_error(err.to_string())
            }
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match &err {
            DomainError::InvalidPath { .. }
            | DomainError::InvalidKey { .. }
            | DomainError::InvalidTypeCast { .. }
            | DomainError::InvalidRequest { .. } => {
                ApiError::new(error_codes::INVALID_PATH, err.to_string())
            }
            DomainError::EntitySetNotFound { .. } => {
                ApiError::new(error_codes::ENTITY_SET_NOT_FOUND, err.to_string())
            }
            DomainError::PropertyNotFound { .. } => {
                ApiError::new(error_codes::PROPERTY_NOT_FOUND, err.to_string())
            }
            DomainError::ReservedPath { .. } => {
                ApiError::new(error_codes::RESERVED_PATH, err.to_string())
            }
            DomainError::InvalidModel { .. } => {
                error!("Model error: {}", err);
                ApiError::internal_error(err.to_string())
            }
        }
    }
}

/// Errors raised while serving a single request.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The request payload or query options are invalid.
    #[error("{0}")]
    BadRequest(String),

    /// The pre-request hook rejected the request.
    #[error("request rejected: {0}")]
    Forbidden(String),

    /// The addressed resource does not support the method.
    #[error("method {method} is not allowed on this resource")]
    MethodNotAllowed {
        method: String,
        allowed: &'static [&'static str],
    },

    /// The resource exists but this server does not serve it.
    #[error("{0}")]
    NotImplemented(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        HandlerError::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        ApiError::from(self).status()
    }
}

impl From<&HandlerError> for ApiError {
    fn from(err: &HandlerError) -> Self {
        match err {
            HandlerError::Storage(inner) => ApiError::from(inner.clone()),
            HandlerError::Domain(inner) => ApiError::from(inner.clone()),
            HandlerError::BadRequest(message) => ApiError::validation_error(message.clone()),
            HandlerError::Forbidden(_) => ApiError::new(error_codes::FORBIDDEN, err.to_string()),
            HandlerError::MethodNotAllowed { .. } => ApiError::method_not_allowed(err.to_string()),
            HandlerError::NotImplemented(message) => ApiError::not_implemented(message.clone()),
            HandlerError::Internal(message) => ApiError::internal_error(message.clone()),
        }
    }
}

impl From<HandlerError> for ApiError {
    fn from(err: HandlerError) -> Self {
        ApiError::from(&err)
    }
}

/// Result type for request handlers.
pub type HandlerResult<T> = Result<T, HandlerError>;
