//! Batch handler implementation.

use std::time::Instant;

use odata_storage::DataStore;
use tracing::{debug, info, instrument};

use super::changeset::{execute_changeset, ChangesetOutcome};
use super::codec;
use super::types::{
    BatchError, BatchItem, BatchLimits, BatchRequest, BatchResponse, BatchResponseItem,
    BatchResult, EncodedBatch,
};
use crate::context::RequestContext;
use crate::request::SubResponse;
use crate::service::Service;

/// Registers descriptions for the batch metrics.
pub fn register_batch_metrics() {
    metrics::describe_counter!(
        "odata_batch_requests_total",
        "Total number of $batch requests by outcome"
    );
    metrics::describe_counter!(
        "odata_batch_parts_total",
        "Total number of executed batch parts by kind and outcome"
    );
    metrics::describe_counter!(
        "odata_changesets_total",
        "Total number of changesets by outcome"
    );
    metrics::describe_histogram!(
        "odata_batch_duration_seconds",
        "Time spent executing $batch requests"
    );
}

fn record_part(kind: &'static str, response: &SubResponse) {
    let outcome = if response.is_error() { "error" } else { "success" };
    metrics::counter!("odata_batch_parts_total", "kind" => kind, "outcome" => outcome)
        .increment(1);
}

/// Handler for `$batch` requests.
///
/// Parts execute strictly sequentially in document order: independent
/// requests through [`Service::handle`] against the ambient store, changesets
/// through a transaction each.
pub struct BatchHandler<S: DataStore> {
    service: Service<S>,
    limits: BatchLimits,
}

impl<S: DataStore> Clone for BatchHandler<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            limits: self.limits,
        }
    }
}

impl<S: DataStore> BatchHandler<S> {
    pub fn new(service: Service<S>) -> Self {
        Self {
            service,
            limits: BatchLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: BatchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn service(&self) -> &Service<S> {
        &self.service
    }

    pub fn limits(&self) -> BatchLimits {
        self.limits
    }

    /// Checks the decoded request against the configured limits.
    pub fn validate(&self, request: &BatchRequest) -> BatchResult<()> {
        let count = request.part_count();
        if count > self.limits.max_parts {
            return Err(BatchError::TooManyParts {
                count,
                max: self.limits.max_parts,
            });
        }
        for (index, item) in request.items.iter().enumerate() {
            if let BatchItem::Changeset(members) = item {
                if members.len() > self.limits.max_changeset_parts {
                    return Err(BatchError::ChangesetTooLarge {
                        index,
                        count: members.len(),
                        max: self.limits.max_changeset_parts,
                    });
                }
            }
        }
        Ok(())
    }

    /// Decodes, executes and encodes a `$batch` request.
    ///
    /// Envelope errors are returned before any part executes.
    pub async fn handle(
        &self,
        content_type: &str,
        body: &[u8],
        context: &RequestContext,
    ) -> BatchResult<EncodedBatch> {
        let request = match codec::decode(content_type, body) {
            Ok(request) => request,
            Err(e) => {
                metrics::counter!("odata_batch_requests_total", "outcome" => "rejected")
                    .increment(1);
                return Err(e);
            }
        };
        if let Err(e) = self.validate(&request) {
            metrics::counter!("odata_batch_requests_total", "outcome" => "rejected").increment(1);
            return Err(e);
        }

        let boundary = request.boundary.clone();
        let response = self.execute(request, context).await;
        metrics::counter!("odata_batch_requests_total", "outcome" => "executed").increment(1);
        Ok(codec::encode(&response, &boundary))
    }

    /// Executes a decoded batch.
    #[instrument(skip_all, fields(items = request.items.len(), parts = request.part_count()))]
    pub async fn execute(&self, request: BatchRequest, context: &RequestContext) -> BatchResponse {
        let started = Instant::now();
        let mut items = Vec::with_capacity(request.items.len());

        for item in request.items {
            match item {
                BatchItem::Request(sub_request) => {
                    let response = self
                        .service
                        .handle(sub_request, context.for_batch_part(false))
                        .await;
                    record_part("request", &response);
                    items.push(BatchResponseItem::Single(response));
                }
                BatchItem::Malformed(malformed) => {
                    debug!(reason = %malformed.reason, "malformed batch part");
                    let response = malformed.to_response();
                    record_part("malformed", &response);
                    items.push(BatchResponseItem::Single(response));
                }
                BatchItem::Changeset(members) => {
                    let (responses, outcome) =
                        execute_changeset(&self.service, &members, context).await;
                    metrics::counter!("odata_changesets_total", "outcome" => outcome.as_str())
                        .increment(1);
                    for response in &responses {
                        record_part("changeset", response);
                    }
                    if outcome != ChangesetOutcome::Committed {
                        debug!(outcome = outcome.as_str(), "changeset did not commit");
                    }
                    items.push(BatchResponseItem::Changeset(responses));
                }
            }
        }

        let elapsed = started.elapsed();
        metrics::histogram!("odata_batch_duration_seconds").record(elapsed.as_secs_f64());
        info!(
            parts = items.len(),
            duration_ms = elapsed.as_millis() as u64,
            "batch executed"
        );
        BatchResponse { items }
    }
}
