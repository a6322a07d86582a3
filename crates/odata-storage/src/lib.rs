//! odata-storage: Storage abstraction layer
//!
//! This crate provides the storage abstraction for the OData service, including:
//! - `EntityStore` trait for entity CRUD against a storage handle
//! - `DataStore` trait for the ambient store (transactions, health)
//! - `Transaction` trait for changeset-scoped storage views
//! - In-memory transactional implementation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               odata-storage                  │
//! ├─────────────────────────────────────────────┤
//! │  traits.rs   - Store/transaction traits     │
//! │  memory.rs   - In-memory implementation     │
//! │  error.rs    - Storage error types          │
//! └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use memory::{MemoryDataStore, MemoryTransaction};
pub use traits::{
    DataStore, EntityStore, HealthStatus, ListOptions, Record, StoredEntity, Transaction,
    UpdateMode,
};
