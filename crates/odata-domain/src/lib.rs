//! odata-domain: Core OData resource logic
//!
//! This crate contains the transport-independent core of the service:
//! - Entity model (entity sets, singletons, property kinds)
//! - Resource descriptors and the URL path parser
//! - The dispatch router's resource-kind classification
//! - Change events and the pending event queue
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                odata-domain                  │
//! ├─────────────────────────────────────────────┤
//! │  model/      - Entity model & schema        │
//! │  resource/   - Descriptor, parser, router   │
//! │  events.rs   - Change tracking events       │
//! └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod events;
pub mod model;
pub mod resource;

// Re-export commonly used types at the crate root
pub use error::{DomainError, DomainResult};
pub use events::{
    ChangeEvent, ChangeLog, ChangeTracker, ChangeType, PendingChanges, DEFAULT_CHANGE_LOG_CAPACITY,
};
pub use model::{is_qualified_name, EntityModel, EntitySetSchema, PropertyKind, PropertySchema};
pub use resource::{
    classify, format_key_literal, parse_path, split_service_path, CountTarget, EntityKey,
    PropertyAccess, RefTarget, ResourceDescriptor, ResourceKind, Route, RouteContext,
    RESERVED_BATCH, RESERVED_METADATA,
};
