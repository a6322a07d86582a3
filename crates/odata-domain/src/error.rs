//! Domain error types for resource addressing and routing.

use thiserror::Error;

/// Domain-specific errors raised while interpreting a request path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// The request path could not be parsed.
    #[error("invalid resource path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// The path names an entity set the model does not define.
    #[error("entity set not found: {name}")]
    EntitySetNotFound { name: String },

    /// The path names a property the entity type does not define.
    #[error("property '{property}' not found on entity set '{entity_set}'")]
    PropertyNotFound {
        entity_set: String,
        property: String,
    },

    /// The key predicate does not match the entity set's key.
    #[error("invalid key for entity set '{entity_set}': {reason}")]
    InvalidKey { entity_set: String, reason: String },

    /// A type-cast segment is not a namespace-qualified name.
    #[error("invalid type cast '{value}': expected Namespace.TypeName")]
    InvalidTypeCast { value: String },

    /// A reserved service path was addressed where it is not reachable.
    #[error("'{segment}' is not addressable from within a batch request")]
    ReservedPath { segment: String },

    /// The combination of path segments is not a valid OData request.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// The entity model itself is inconsistent.
    #[error("invalid entity model: {message}")]
    InvalidModel { message: String },
}

impl DomainError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        DomainError::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        DomainError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
