//! `$batch` processing.
//!
//! ```text
//! multipart body ──codec::decode──► BatchRequest
//!                                       │
//!             ┌─────────────────────────┴──────────────────────┐
//!             ▼                                                ▼
//!     independent request                                  changeset
//!   Service::handle (ambient store)        execute_changeset (one transaction)
//!             │                                                │
//!             └──────────────► BatchResponse ◄─────────────────┘
//!                                   │
//!                             codec::encode ──► multipart body
//! ```
//!
//! Only envelope errors (not multipart, no boundary, unreadable body, size
//! limits) fail the whole request. Everything else becomes an error response
//! in the slot of the part that caused it.

mod changeset;
pub mod codec;
mod handler;
mod types;

pub use changeset::{execute_changeset, ChangesetOutcome};
pub use handler::{register_batch_metrics, BatchHandler};
pub use types::{
    BatchError, BatchItem, BatchLimits, BatchRequest, BatchResponse, BatchResponseItem,
    BatchResult, ChangesetMember, EncodedBatch, MalformedPart, DEFAULT_MAX_CHANGESET_PARTS,
    DEFAULT_MAX_PARTS,
};

#[cfg(test)]
mod codec_proptest;
