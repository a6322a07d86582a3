//! In-memory storage implementation.
//!
//! Entity sets are held as ordered maps keyed by canonical key, so collection
//! reads are deterministic. Transactions buffer their writes in an overlay
//! that reads fall through; commit validates the overlay against the
//! committed state and applies it under a single write lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, instrument, warn};

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    validate_entity_set_name, validate_key, DataStore, EntityStore, HealthStatus, ListOptions,
    Record, StoredEntity, Transaction, UpdateMode,
};

type Table = BTreeMap<String, Record>;
type Tables = HashMap<String, Table>;

fn set_not_found(entity_set: &str) -> StorageError {
    StorageError::EntitySetNotFound {
        entity_set: entity_set.to_string(),
    }
}

fn entity_not_found(entity_set: &str, key: &str) -> StorageError {
    StorageError::EntityNotFound {
        entity_set: entity_set.to_string(),
        key: key.to_string(),
    }
}

/// In-memory implementation of DataStore.
///
/// # Performance Characteristics
///
/// - **Get / insert / update / delete**: O(log N) (BTreeMap)
/// - **List**: O(N) for the addressed set
/// - **Commit**: O(W log N) where W is the number of buffered writes
///
/// All committed state sits behind one `RwLock`, which is what makes a
/// multi-set commit atomic for concurrent readers.
#[derive(Debug, Default)]
pub struct MemoryDataStore {
    tables: Arc<RwLock<Tables>>,
    next_transaction_id: AtomicU64,
}

impl MemoryDataStore {
    /// Creates a new in-memory data store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with the given (empty) entity sets.
    pub fn with_entity_sets<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        {
            let mut tables = store.tables.write();
            for name in names {
                tables.entry(name.into()).or_default();
            }
        }
        store
    }
}

#[async_trait]
impl EntityStore for MemoryDataStore {
    async fn list(
        &self,
        entity_set: &str,
        options: &ListOptions,
    ) -> StorageResult<Vec<StoredEntity>> {
        let tables = self.tables.read();
        let table = tables
            .get(entity_set)
            .ok_or_else(|| set_not_found(entity_set))?;
        Ok(options.apply(
            table
                .iter()
                .map(|(key, record)| StoredEntity::new(key.clone(), record.clone())),
        ))
    }

    async fn get(&self, entity_set: &str, key: &str) -> StorageResult<StoredEntity> {
        let tables = self.tables.read();
        let table = tables
            .get(entity_set)
            .ok_or_else(|| set_not_found(entity_set))?;
        table
            .get(key)
            .map(|record| StoredEntity::new(key, record.clone()))
            .ok_or_else(|| entity_not_found(entity_set, key))
    }

    async fn insert(
        &self,
        entity_set: &str,
        key: &str,
        record: Record,
    ) -> StorageResult<StoredEntity> {
        validate_key(key)?;

        let mut tables = self.tables.write();
        let table = tables
            .get_mut(entity_set)
            .ok_or_else(|| set_not_found(entity_set))?;

        use std::collections::btree_map::Entry;
        match table.entry(key.to_string()) {
            Entry::Occupied(_) => Err(StorageError::DuplicateEntity {
                entity_set: entity_set.to_string(),
                key: key.to_string(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(record.clone());
                Ok(StoredEntity::new(key, record))
            }
        }
    }

    async fn update(
        &self,
        entity_set: &str,
        key: &str,
        record: Record,
        mode: UpdateMode,
    ) -> StorageResult<StoredEntity> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(entity_set)
            .ok_or_else(|| set_not_found(entity_set))?;
        let existing = table
            .get_mut(key)
            .ok_or_else(|| entity_not_found(entity_set, key))?;

        let combined = mode.combine(existing, record);
        *existing = combined;
        Ok(StoredEntity::new(key, existing.clone()))
    }

    async fn delete(&self, entity_set: &str, key: &str) -> StorageResult<()> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(entity_set)
            .ok_or_else(|| set_not_found(entity_set))?;
        table
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| entity_not_found(entity_set, key))
    }

    async fn count(&self, entity_set: &str) -> StorageResult<u64> {
        let tables = self.tables.read();
        tables
            .get(entity_set)
            .map(|table| table.len() as u64)
            .ok_or_else(|| set_not_found(entity_set))
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    async fn create_entity_set(&self, name: &str) -> StorageResult<()> {
        validate_entity_set_name(name)?;

        let mut tables = self.tables.write();
        if tables.contains_key(name) {
            return Err(StorageError::EntitySetAlreadyExists {
                entity_set: name.to_string(),
            });
        }
        tables.insert(name.to_string(), Table::new());
        Ok(())
    }

    async fn begin_transaction(&self) -> StorageResult<Box<dyn Transaction>> {
        let id = self.next_transaction_id.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(transaction_id = id, "memory transaction opened");
        Ok(Box::new(MemoryTransaction {
            id,
            tables: Arc::clone(&self.tables),
            overlay: Mutex::new(BTreeMap::new()),
            finished: false,
        }))
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let start = Instant::now();
        let sets = self.tables.read().len();
        Ok(HealthStatus {
            healthy: true,
            latency: start.elapsed(),
            message: Some(format!("memory store with {sets} entity sets")),
        })
    }
}

/// A buffered write, holding the entity as it will look after commit.
///
/// Writes to a committed row keep the row as the transaction first read it
/// in `base`; commit fails if the committed row no longer matches.
#[derive(Debug, Clone)]
enum PendingWrite {
    /// Key did not exist when the transaction wrote it.
    Insert(Record),
    /// Key existed; replaced by `record`.
    Update { base: Record, record: Record },
    /// Key existed; removed.
    Delete { base: Record },
}

type Overlay = BTreeMap<(String, String), PendingWrite>;

/// Transaction over a [`MemoryDataStore`].
///
/// Dropping the transaction without calling `commit` discards its writes,
/// which is also what happens when the future driving a changeset is
/// cancelled.
#[derive(Debug)]
pub struct MemoryTransaction {
    id: u64,
    tables: Arc<RwLock<Tables>>,
    overlay: Mutex<Overlay>,
    finished: bool,
}

impl MemoryTransaction {
    /// Looks up the current value of a key as seen by this transaction.
    fn resolve(&self, entity_set: &str, key: &str) -> StorageResult<Option<Record>> {
        let slot = (entity_set.to_string(), key.to_string());
        if let Some(write) = self.overlay.lock().get(&slot) {
            return Ok(match write {
                PendingWrite::Insert(record) | PendingWrite::Update { record, .. } => {
                    Some(record.clone())
                }
                PendingWrite::Delete { .. } => None,
            });
        }

        let tables = self.tables.read();
        let table = tables
            .get(entity_set)
            .ok_or_else(|| set_not_found(entity_set))?;
        Ok(table.get(key).cloned())
    }

    fn ensure_set(&self, entity_set: &str) -> StorageResult<()> {
        if self.tables.read().contains_key(entity_set) {
            Ok(())
        } else {
            Err(set_not_found(entity_set))
        }
    }
}

#[async_trait]
impl EntityStore for MemoryTransaction {
    async fn list(
        &self,
        entity_set: &str,
        options: &ListOptions,
    ) -> StorageResult<Vec<StoredEntity>> {
        let mut view: Table = {
            let tables = self.tables.read();
            tables
                .get(entity_set)
                .cloned()
                .ok_or_else(|| set_not_found(entity_set))?
        };

        let overlay = self.overlay.lock();
        for ((set, key), write) in overlay.iter() {
            if set != entity_set {
                continue;
            }
            match write {
                PendingWrite::Insert(record) | PendingWrite::Update { record, .. } => {
                    view.insert(key.clone(), record.clone());
                }
                PendingWrite::Delete { .. } => {
                    view.remove(key);
                }
            }
        }

        Ok(options.apply(
            view.into_iter()
                .map(|(key, record)| StoredEntity::new(key, record)),
        ))
    }

    async fn get(&self, entity_set: &str, key: &str) -> StorageResult<StoredEntity> {
        self.resolve(entity_set, key)?
            .map(|record| StoredEntity::new(key, record))
            .ok_or_else(|| entity_not_found(entity_set, key))
    }

    async fn insert(
        &self,
        entity_set: &str,
        key: &str,
        record: Record,
    ) -> StorageResult<StoredEntity> {
        validate_key(key)?;
        self.ensure_set(entity_set)?;

        let committed = self
            .tables
            .read()
            .get(entity_set)
            .map_or(false, |table| table.contains_key(key));

        let slot = (entity_set.to_string(), key.to_string());
        let mut overlay = self.overlay.lock();
        let write = match overlay.get(&slot) {
            Some(PendingWrite::Insert(_)) | Some(PendingWrite::Update { .. }) => {
                return Err(StorageError::DuplicateEntity {
                    entity_set: entity_set.to_string(),
                    key: key.to_string(),
                });
            }
            // Deleted earlier in this transaction: re-creating is an update of the committed row.
            Some(PendingWrite::Delete { base }) => PendingWrite::Update {
                base: base.clone(),
                record: record.clone(),
            },
            None if committed => {
                return Err(StorageError::DuplicateEntity {
                    entity_set: entity_set.to_string(),
                    key: key.to_string(),
                });
            }
            None => PendingWrite::Insert(record.clone()),
        };
        overlay.insert(slot, write);

        Ok(StoredEntity::new(key, record))
    }

    async fn update(
        &self,
        entity_set: &str,
        key: &str,
        record: Record,
        mode: UpdateMode,
    ) -> StorageResult<StoredEntity> {
        let existing = self
            .resolve(entity_set, key)?
            .ok_or_else(|| entity_not_found(entity_set, key))?;
        let updated = mode.combine(&existing, record);

        let slot = (entity_set.to_string(), key.to_string());
        let mut overlay = self.overlay.lock();
        let write = match overlay.get(&slot) {
            Some(PendingWrite::Insert(_)) => PendingWrite::Insert(updated.clone()),
            Some(PendingWrite::Update { base, .. }) | Some(PendingWrite::Delete { base }) => {
                PendingWrite::Update {
                    base: base.clone(),
                    record: updated.clone(),
                }
            }
            None => PendingWrite::Update {
                base: existing,
                record: updated.clone(),
            },
        };
        overlay.insert(slot, write);

        Ok(StoredEntity::new(key, updated))
    }

    async fn delete(&self, entity_set: &str, key: &str) -> StorageResult<()> {
        let existing = self
            .resolve(entity_set, key)?
            .ok_or_else(|| entity_not_found(entity_set, key))?;

        let slot = (entity_set.to_string(), key.to_string());
        let mut overlay = self.overlay.lock();
        let base = match overlay.get(&slot) {
            // Never committed: forget it entirely.
            Some(PendingWrite::Insert(_)) => {
                overlay.remove(&slot);
                return Ok(());
            }
            Some(PendingWrite::Update { base, .. }) | Some(PendingWrite::Delete { base }) => {
                base.clone()
            }
            None => existing,
        };
        overlay.insert(slot, PendingWrite::Delete { base });
        Ok(())
    }

    async fn count(&self, entity_set: &str) -> StorageResult<u64> {
        let entities = self.list(entity_set, &ListOptions::default()).await?;
        Ok(entities.len() as u64)
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    fn as_store(&self) -> &dyn EntityStore {
        self
    }

    #[instrument(skip_all, fields(transaction_id = self.id))]
    async fn commit(mut self: Box<Self>) -> StorageResult<()> {
        let overlay = std::mem::take(&mut *self.overlay.lock());
        self.finished = true;

        let mut tables = self.tables.write();

        // Validate everything first so a conflict leaves committed state untouched.
        for ((set, key), write) in &overlay {
            let table = tables.get(set).ok_or_else(|| set_not_found(set))?;
            let current = table.get(key);
            let conflict = match write {
                PendingWrite::Insert(_) if current.is_some() => {
                    Some("entity was created concurrently")
                }
                PendingWrite::Insert(_) => None,
                PendingWrite::Update { base, .. } | PendingWrite::Delete { base } => {
                    match current {
                        None => Some("entity was deleted concurrently"),
                        Some(row) if row != base => Some("entity was modified concurrently"),
                        Some(_) => None,
                    }
                }
            };
            if let Some(message) = conflict {
                warn!(
                    transaction_id = self.id,
                    entity_set = %set,
                    key = %key,
                    "commit rejected: {message}"
                );
                return Err(StorageError::WriteConflict {
                    entity_set: set.clone(),
                    key: key.clone(),
                    message: message.to_string(),
                });
            }
        }

        let writes = overlay.len();
        for ((set, key), write) in overlay {
            let Some(table) = tables.get_mut(&set) else {
                continue;
            };
            match write {
                PendingWrite::Insert(record) | PendingWrite::Update { record, .. } => {
                    table.insert(key, record);
                }
                PendingWrite::Delete { .. } => {
                    table.remove(&key);
                }
            }
        }

        debug!(transaction_id = self.id, writes, "memory transaction committed");
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> StorageResult<()> {
        let discarded = std::mem::take(&mut *self.overlay.lock()).len();
        self.finished = true;
        debug!(transaction_id = self.id, discarded, "memory transaction rolled back");
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            let discarded = self.overlay.get_mut().len();
            debug!(
                transaction_id = self.id,
                discarded, "memory transaction dropped without commit, writes discarded"
            );
        }
    }
}
