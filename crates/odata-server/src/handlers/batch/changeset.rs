//! Changeset execution.
//!
//! A changeset runs in one storage transaction. Members execute in document
//! order through [`Service::execute`] with a scope bound to the transaction;
//! the first error response stops execution. A failed changeset is rolled
//! back and its change events are discarded. A successful one is committed,
//! and only then are its events published.
//!
//! After a rollback every response other than the failing one is replaced by
//! a `424 Failed Dependency`, so no response reports an effect that was
//! reverted.

use std::collections::HashMap;

use odata_storage::DataStore;
use tracing::{debug, error, info, instrument};

use super::types::{ChangesetMember, MalformedPart};
use crate::context::{RequestContext, TransactionContext};
use crate::error::{error_codes, ApiError};
use crate::request::{SubRequest, SubResponse};
use crate::service::Service;

/// How a changeset ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangesetOutcome {
    Committed,
    RolledBack,
    /// The transaction could not be opened or committed.
    Failed,
}

impl ChangesetOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangesetOutcome::Committed => "committed",
            ChangesetOutcome::RolledBack => "rolled_back",
            ChangesetOutcome::Failed => "failed",
        }
    }
}

fn member_content_id(member: &ChangesetMember) -> Option<String> {
    match member {
        Ok(request) => request.content_id.clone(),
        Err(MalformedPart { content_id, .. }) => content_id.clone(),
    }
}

fn failed_dependency(code: &str, message: &str, content_id: Option<String>) -> SubResponse {
    SubResponse::from_api_error(&ApiError::new(code, message)).with_content_id(content_id)
}

/// Replaces a leading `$<content-id>` segment with the location of the entity
/// created by an earlier member.
fn resolve_content_id_reference(
    request: &SubRequest,
    locations: &HashMap<String, String>,
) -> Option<SubRequest> {
    let url = request.url.trim_start_matches('/');
    let reference = url.strip_prefix('$')?;
    let end = reference
        .find(|c: char| c == '/' || c == '?' || c == '(')
        .unwrap_or(reference.len());
    let location = locations.get(&reference[..end])?;

    let mut resolved = request.clone();
    resolved.url = format!("{location}{}", &reference[end..]);
    Some(resolved)
}

/// Executes one changeset and returns its responses in document order.
///
/// If the transaction cannot be opened or committed, a single `500` response
/// stands in for the whole changeset.
#[instrument(skip_all, fields(members = members.len()))]
pub async fn execute_changeset<S: DataStore>(
    service: &Service<S>,
    members: &[ChangesetMember],
    context: &RequestContext,
) -> (Vec<SubResponse>, ChangesetOutcome) {
    let mut transaction = match TransactionContext::begin(service.storage().as_ref()).await {
        Ok(transaction) => transaction,
        Err(e) => {
            error!(error = %e, "failed to open changeset transaction");
            let response = SubResponse::from_api_error(&ApiError::internal_error(format!(
                "failed to open changeset transaction: {e}"
            )));
            return (vec![response], ChangesetOutcome::Failed);
        }
    };

    let mut responses = Vec::with_capacity(members.len());
    let mut locations: HashMap<String, String> = HashMap::new();
    let mut failed_at = None;

    for (index, member) in members.iter().enumerate() {
        let response = match member {
            Err(malformed) => malformed.to_response(),
            Ok(request) => {
                let resolved = resolve_content_id_reference(request, &locations);
                let request = resolved.as_ref().unwrap_or(request);
                let mut scope = transaction.scope();
                service
                    .execute(request, context.for_batch_part(true), &mut scope)
                    .await
            }
        };

        if response.is_error() {
            debug!(
                index,
                status = response.status.as_u16(),
                "changeset member failed"
            );
            responses.push(response);
            failed_at = Some(index);
            break;
        }
        if let (Some(id), Some(location)) = (&response.content_id, response.header("location")) {
            locations.insert(id.clone(), location.to_string());
        }
        responses.push(response);
    }

    if let Some(failed_index) = failed_at {
        let pending = transaction.pending();
        if let Err(e) = transaction.rollback().await {
            error!(error = %e, "changeset rollback failed");
        }
        info!(
            failed_index,
            discarded_events = pending,
            "changeset rolled back"
        );

        for response in responses.iter_mut().take(failed_index) {
            *response = failed_dependency(
                error_codes::CHANGESET_ROLLED_BACK,
                "changeset was rolled back because a later request failed",
                response.content_id.take(),
            );
        }
        for member in &members[failed_index + 1..] {
            responses.push(failed_dependency(
                error_codes::CHANGESET_ABORTED,
                "request was not attempted because an earlier request in the changeset failed",
                member_content_id(member),
            ));
        }
        return (responses, ChangesetOutcome::RolledBack);
    }

    match transaction.commit().await {
        Ok(events) => {
            debug!(events = events.len(), "changeset committed");
            if !events.is_empty() {
                service.tracker().publish(events).await;
            }
            (responses, ChangesetOutcome::Committed)
        }
        Err(e) => {
            error!(error = %e, "changeset commit failed");
            let response = SubResponse::from_api_error(&ApiError::internal_error(format!(
                "failed to commit changeset: {e}"
            )));
            (vec![response], ChangesetOutcome::Failed)
        }
    }
}
