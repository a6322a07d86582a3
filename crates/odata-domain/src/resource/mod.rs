//! Resource addressing.
//!
//! A request path is parsed once into an immutable [`ResourceDescriptor`],
//! which the router then classifies into a closed [`ResourceKind`].
//!
//! ```text
//! "People(1)/Orders/$count" ──parse_path──► ResourceDescriptor
//!                                               │
//!                                   classify ◄──┘ (+ EntityModel)
//!                                               │
//!                                               ▼
//!                         ResourceKind::Count(CountTarget::Navigation { .. })
//! ```

mod descriptor;
mod path;
#[cfg(test)]
mod path_proptest;
mod router;

pub use descriptor::{format_key_literal, EntityKey, ResourceDescriptor};
pub use path::{parse_path, split_service_path, RESERVED_BATCH, RESERVED_METADATA};
pub use router::{
    classify, CountTarget, PropertyAccess, RefTarget, ResourceKind, Route, RouteContext,
};
