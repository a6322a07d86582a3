//! Pre-request hook.
//!
//! The hook runs once for every request immediately before dispatch:
//! top-level requests, independent batch parts and changeset members alike.
//! It can contribute claims to the request context or reject the request,
//! which then becomes a `403` response without reaching any handler.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::request::SubRequest;

/// Claims to merge into the request context.
pub type ContextUpdate = BTreeMap<String, String>;

/// Reason a hook rejected a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct HookRejection {
    pub reason: String,
}

impl HookRejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait PreRequestHook: Send + Sync + 'static {
    /// Inspects a request before dispatch.
    ///
    /// Returns claims to merge into the context (possibly none), or a
    /// rejection.
    async fn before_request(
        &self,
        request: &SubRequest,
        context: &RequestContext,
    ) -> Result<Option<ContextUpdate>, HookRejection>;
}

/// A hook that accepts every request unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl PreRequestHook for AllowAll {
    async fn before_request(
        &self,
        _request: &SubRequest,
        _context: &RequestContext,
    ) -> Result<Option<ContextUpdate>, HookRejection> {
        Ok(None)
    }
}

/// Requires a header on every request and exposes its value as a claim.
///
/// A minimal hook for deployments behind an authenticating proxy that
/// forwards the caller's identity in a header.
#[derive(Debug, Clone)]
pub struct RequireHeader {
    header: String,
    claim: String,
}

impl RequireHeader {
    pub fn new(header: impl Into<String>, claim: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            claim: claim.into(),
        }
    }
}

#[async_trait]
impl PreRequestHook for RequireHeader {
    async fn before_request(
        &self,
        request: &SubRequest,
        context: &RequestContext,
    ) -> Result<Option<ContextUpdate>, HookRejection> {
        // Batch parts inherit the identity established for the outer request
        // and may not replace it.
        if let Some(existing) = context.claim(&self.claim) {
            return match request.header(&self.header).map(str::trim) {
                None => Ok(None),
                Some(value) if value == existing => Ok(None),
                Some(_) => Err(HookRejection::new(format!(
                    "header '{}' conflicts with the identity of the enclosing request",
                    self.header
                ))),
            };
        }
        match request.header(&self.header) {
            Some(value) if !value.trim().is_empty() => Ok(Some(BTreeMap::from([(
                self.claim.clone(),
                value.trim().to_string(),
            )]))),
            _ => Err(HookRejection::new(format!(
                "missing required header '{}'",
                self.header
            ))),
        }
    }
}
