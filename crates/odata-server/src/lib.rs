//! odata-server: Request execution and the `$batch` engine
//!
//! This crate contains the request execution layer including:
//! - The request service (hook, path parsing, routing, dispatch)
//! - Entity set handlers and the property resolver
//! - The `$batch` multipart codec and executors
//! - Changeset transactions and change event publication
//! - Configuration management
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                odata-server                  │
//! ├─────────────────────────────────────────────┤
//! │  config.rs   - Configuration management     │
//! │  service.rs  - Single request execution     │
//! │  hook.rs     - Pre-request hook             │
//! │  context.rs  - Request & transaction scope  │
//! │  handlers/   - Request handlers             │
//! │    dispatch.rs  - Route dispatch            │
//! │    entity.rs    - Entity set handlers       │
//! │    property.rs  - Property resolution       │
//! │    batch/       - $batch codec & executors  │
//! └─────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod hook;
pub mod request;
pub mod service;

// Re-exports for convenience
pub use config::{ConfigLoadError, ServerConfig};
pub use context::{ExecutionScope, QueryOptions, RequestContext, TransactionContext};
pub use error::{error_codes, ApiError, HandlerError, HandlerResult};
pub use handlers::batch::{BatchError, BatchHandler, BatchLimits, EncodedBatch};
pub use handlers::{Dispatcher, EntitySetHandler, PropertyResolver};
pub use hook::{AllowAll, ContextUpdate, HookRejection, PreRequestHook, RequireHeader};
pub use request::{SubRequest, SubResponse};
pub use service::Service;
