//! Data types for `$batch` processing.

use bytes::Bytes;

use crate::error::ApiError;
use crate::request::{SubRequest, SubResponse};

/// Default maximum number of requests in one batch, counting changeset members.
pub const DEFAULT_MAX_PARTS: usize = 1000;

/// Default maximum number of requests in one changeset.
pub const DEFAULT_MAX_CHANGESET_PARTS: usize = 100;

/// Size limits enforced before any part executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_parts: usize,
    pub max_changeset_parts: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_parts: DEFAULT_MAX_PARTS,
            max_changeset_parts: DEFAULT_MAX_CHANGESET_PARTS,
        }
    }
}

/// A part that could not be decoded into a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedPart {
    /// `Content-ID` of the part envelope, when it could be read.
    pub content_id: Option<String>,
    pub reason: String,
}

impl MalformedPart {
    pub fn new(content_id: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            content_id,
            reason: reason.into(),
        }
    }

    /// The synthetic error response standing in for this part.
    pub fn to_response(&self) -> SubResponse {
        SubResponse::from_api_error(&ApiError::invalid_batch(self.reason.clone()))
            .with_content_id(self.content_id.clone())
    }
}

/// A member of a changeset: a request, or the reason it could not be decoded.
pub type ChangesetMember = Result<SubRequest, MalformedPart>;

/// One top-level part of a batch.
#[derive(Debug, Clone)]
pub enum BatchItem {
    /// An independent request.
    Request(SubRequest),
    /// An atomic group of requests.
    Changeset(Vec<ChangesetMember>),
    /// A top-level part that could not be decoded.
    Malformed(MalformedPart),
}

/// A decoded `$batch` request body.
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    /// Boundary of the request envelope.
    pub boundary: String,
    pub items: Vec<BatchItem>,
}

impl BatchRequest {
    pub fn new(boundary: impl Into<String>, items: Vec<BatchItem>) -> Self {
        Self {
            boundary: boundary.into(),
            items,
        }
    }

    /// Number of requests, counting every changeset member.
    pub fn part_count(&self) -> usize {
        self.items
            .iter()
            .map(|item| match item {
                BatchItem::Changeset(members) => members.len(),
                BatchItem::Request(_) | BatchItem::Malformed(_) => 1,
            })
            .sum()
    }
}

/// Responses for one top-level part, mirroring the request shape.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchResponseItem {
    Single(SubResponse),
    Changeset(Vec<SubResponse>),
}

/// Responses for a whole batch, in request order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResponse {
    pub items: Vec<BatchResponseItem>,
}

impl BatchResponse {
    /// All responses flattened in document order.
    pub fn responses(&self) -> impl Iterator<Item = &SubResponse> {
        self.items.iter().flat_map(|item| match item {
            BatchResponseItem::Single(response) => std::slice::from_ref(response).iter(),
            BatchResponseItem::Changeset(responses) => responses.iter(),
        })
    }
}

/// An encoded multipart response body.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedBatch {
    /// `multipart/mixed; boundary=...`
    pub content_type: String,
    pub body: Bytes,
}

/// Envelope-level failures. Any of these rejects the whole batch before a
/// single part executes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    #[error("unsupported batch content type '{content_type}', expected multipart/mixed")]
    UnsupportedContentType { content_type: String },

    #[error("batch content type has no boundary parameter")]
    MissingBoundary,

    #[error("malformed batch body: {0}")]
    Malformed(String),

    #[error("batch contains {count} requests, the limit is {max}")]
    TooManyParts { count: usize, max: usize },

    #[error("changeset at part {index} contains {count} requests, the limit is {max}")]
    ChangesetTooLarge {
        index: usize,
        count: usize,
        max: usize,
    },
}

impl From<&BatchError> for ApiError {
    fn from(err: &BatchError) -> Self {
        ApiError::invalid_batch(err.to_string())
    }
}

/// Result type for batch operations.
pub type BatchResult<T> = Result<T, BatchError>;
