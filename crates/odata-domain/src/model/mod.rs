//! Entity model types.
//!
//! This module contains:
//! - Entity set and singleton schemas
//! - Property kinds (primitive, complex, stream, navigation)
//! - Model validation and key canonicalization

mod types;

pub use types::*;
