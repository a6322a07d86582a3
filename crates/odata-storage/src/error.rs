//! Storage error types.

use thiserror::Error;

/// Storage-specific errors.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Entity set not found.
    #[error("entity set not found: {entity_set}")]
    EntitySetNotFound { entity_set: String },

    /// Entity set already exists.
    #[error("entity set already exists: {entity_set}")]
    EntitySetAlreadyExists { entity_set: String },

    /// Entity not found.
    #[error("entity not found: {entity_set}({key})")]
    EntityNotFound { entity_set: String, key: String },

    /// Entity with the same key already exists.
    #[error("duplicate entity: {entity_set}({key})")]
    DuplicateEntity { entity_set: String, key: String },

    /// A committed write conflicts with changes made by another transaction.
    #[error("write conflict on {entity_set}({key}): {message}")]
    WriteConflict {
        entity_set: String,
        key: String,
        message: String,
    },

    /// Transaction error (begin, commit or rollback failed).
    #[error("transaction error: {message}")]
    TransactionError { message: String },

    /// Invalid input error.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Health check failed.
    #[error("health check failed: {message}")]
    HealthCheckFailed { message: String },

    /// Internal error.
    #[error("internal storage error: {message}")]
    InternalError { message: String },
}

impl StorageError {
    /// Returns true if the error means the addressed entity or set does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::EntityNotFound { .. } | StorageError::EntitySetNotFound { .. }
        )
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
