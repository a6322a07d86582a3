//! Storage trait definitions.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};

/// Property bag of a stored entity.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// An entity as held by storage, addressed by its canonical key string.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntity {
    /// Canonical key (the literal form used inside `Set(<key>)`).
    pub key: String,
    /// Entity properties.
    pub record: Record,
}

impl StoredEntity {
    pub fn new(key: impl Into<String>, record: Record) -> Self {
        Self {
            key: key.into(),
            record,
        }
    }
}

/// Paging options for collection reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Number of entities to skip.
    pub skip: Option<usize>,
    /// Maximum number of entities to return.
    pub top: Option<usize>,
}

impl ListOptions {
    /// Applies skip/top to an ordered iterator.
    pub fn apply<T>(&self, items: impl Iterator<Item = T>) -> Vec<T> {
        let skipped = items.skip(self.skip.unwrap_or(0));
        match self.top {
            Some(top) => skipped.take(top).collect(),
            None => skipped.collect(),
        }
    }
}

/// How an update combines the new properties with the stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// PATCH semantics: supplied properties overwrite, others are kept.
    Merge,
    /// PUT semantics: the stored entity is replaced wholesale.
    Replace,
}

impl UpdateMode {
    /// Combines `existing` with `incoming` according to the mode.
    pub fn combine(self, existing: &Record, incoming: Record) -> Record {
        match self {
            UpdateMode::Replace => incoming,
            UpdateMode::Merge => {
                let mut merged = existing.clone();
                for (name, value) in incoming {
                    merged.insert(name, value);
                }
                merged
            }
        }
    }
}

/// Storage health status.
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub latency: Duration,
    pub message: Option<String>,
}

/// Entity operations available on any storage handle.
///
/// Both the ambient store and an open transaction implement this trait, so
/// request handlers are written once and bound to either at dispatch time.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Lists entities of a set in key order.
    async fn list(&self, entity_set: &str, options: &ListOptions)
        -> StorageResult<Vec<StoredEntity>>;

    /// Gets a single entity by key.
    async fn get(&self, entity_set: &str, key: &str) -> StorageResult<StoredEntity>;

    /// Inserts a new entity. Fails with `DuplicateEntity` if the key is taken.
    async fn insert(&self, entity_set: &str, key: &str, record: Record)
        -> StorageResult<StoredEntity>;

    /// Updates an existing entity.
    async fn update(
        &self,
        entity_set: &str,
        key: &str,
        record: Record,
        mode: UpdateMode,
    ) -> StorageResult<StoredEntity>;

    /// Deletes an entity.
    async fn delete(&self, entity_set: &str, key: &str) -> StorageResult<()>;

    /// Counts the entities of a set.
    async fn count(&self, entity_set: &str) -> StorageResult<u64>;
}

/// A storage transaction.
///
/// Writes made through the transaction are visible to reads made through the
/// same transaction and to nobody else until [`Transaction::commit`] succeeds.
/// Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait Transaction: EntityStore {
    /// This transaction viewed as a plain entity store.
    fn as_store(&self) -> &dyn EntityStore;

    /// Makes every write of the transaction visible atomically.
    async fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Discards every write of the transaction.
    async fn rollback(self: Box<Self>) -> StorageResult<()>;
}

/// Abstract storage interface for the service.
///
/// Implementations must be thread-safe (Send + Sync) and support
/// async operations.
#[async_trait]
pub trait DataStore: EntityStore + 'static {
    /// Creates an empty entity set.
    async fn create_entity_set(&self, name: &str) -> StorageResult<()>;

    /// Opens a new transaction over this store.
    async fn begin_transaction(&self) -> StorageResult<Box<dyn Transaction>>;

    /// Performs a health check on the storage backend.
    async fn health_check(&self) -> StorageResult<HealthStatus>;
}

/// Validates an entity set name.
pub fn validate_entity_set_name(name: &str) -> StorageResult<()> {
    if name.is_empty() {
        return Err(StorageError::InvalidInput {
            message: "entity set name cannot be empty".to_string(),
        });
    }
    if name.starts_with('$') {
        return Err(StorageError::InvalidInput {
            message: format!("entity set name cannot start with '$': {name}"),
        });
    }
    Ok(())
}

/// Validates an entity key.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidInput {
            message: "entity key cannot be empty".to_string(),
        });
    }
    Ok(())
}
