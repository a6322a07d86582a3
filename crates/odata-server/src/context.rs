//! Request-scoped context.
//!
//! Every handler call receives a [`RequestContext`] (who is asking, what was
//! parsed from the URL) and an [`ExecutionScope`] (which store to use and
//! where to record change events). Ordinary requests get a scope over the
//! ambient store; changeset members get one over the changeset's
//! [`TransactionContext`].

use std::collections::BTreeMap;

use odata_domain::{ChangeEvent, PendingChanges};
use odata_storage::{DataStore, EntityStore, StorageResult, Transaction};
use tracing::{debug, instrument};

use crate::error::{HandlerError, HandlerResult};

/// Parsed query string.
///
/// Only `$top` and `$skip` are interpreted here; everything else is kept raw
/// for handlers that understand it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub top: Option<usize>,
    pub skip: Option<usize>,
    pub raw: Vec<(String, String)>,
}

impl QueryOptions {
    pub fn parse(query: Option<&str>) -> HandlerResult<Self> {
        let mut options = QueryOptions::default();
        let Some(query) = query else {
            return Ok(options);
        };

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let name = decode(name)?;
            let value = decode(value)?;
            match name.as_str() {
                "$top" => options.top = Some(parse_count(&name, &value)?),
                "$skip" => options.skip = Some(parse_count(&name, &value)?),
                _ => {}
            }
            options.raw.push((name, value));
        }
        Ok(options)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.raw
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, value)| value.as_str())
    }
}

fn decode(text: &str) -> HandlerResult<String> {
    urlencoding::decode(&text.replace('+', " "))
        .map(|s| s.into_owned())
        .map_err(|_| HandlerError::bad_request(format!("invalid query string component '{text}'")))
}

fn parse_count(name: &str, value: &str) -> HandlerResult<usize> {
    value.parse::<usize>().map_err(|_| {
        HandlerError::bad_request(format!(
            "{name} must be a non-negative integer, got '{value}'"
        ))
    })
}

/// Per-request information visible to hooks and handlers.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Correlation id of the enclosing HTTP request.
    pub request_id: Option<String>,
    /// True for sub-requests embedded in a `$batch` body.
    pub in_batch: bool,
    /// True for members of a changeset.
    pub in_changeset: bool,
    /// Validated `Namespace.TypeName` cast from the path.
    pub type_cast: Option<String>,
    /// Claims merged in by the pre-request hook.
    pub claims: BTreeMap<String, String>,
    pub query: QueryOptions,
}

impl RequestContext {
    pub fn new(request_id: Option<String>) -> Self {
        Self {
            request_id,
            ..Self::default()
        }
    }

    /// Context for a sub-request of a batch.
    pub fn for_batch_part(&self, in_changeset: bool) -> Self {
        Self {
            request_id: self.request_id.clone(),
            in_batch: true,
            in_changeset,
            claims: self.claims.clone(),
            ..Self::default()
        }
    }

    pub fn claim(&self, name: &str) -> Option<&str> {
        self.claims.get(name).map(String::as_str)
    }

    /// Merges claims returned by a hook; later values win.
    pub fn merge_claims(&mut self, claims: BTreeMap<String, String>) {
        self.claims.extend(claims);
    }
}

/// The store and event queue a request executes against.
pub struct ExecutionScope<'a> {
    pub store: &'a dyn EntityStore,
    pub changes: &'a mut PendingChanges,
}

impl<'a> ExecutionScope<'a> {
    pub fn new(store: &'a dyn EntityStore, changes: &'a mut PendingChanges) -> Self {
        Self { store, changes }
    }

    pub fn record(&mut self, event: ChangeEvent) {
        self.changes.record(event);
    }
}

/// An open transaction and the events recorded against it.
///
/// Owned by the changeset executor for the lifetime of one changeset.
/// Dropping it without calling [`commit`](Self::commit) discards both.
pub struct TransactionContext {
    transaction: Box<dyn Transaction>,
    changes: PendingChanges,
}

impl TransactionContext {
    pub async fn begin<S: DataStore + ?Sized>(store: &S) -> StorageResult<Self> {
        let transaction = store.begin_transaction().await?;
        Ok(Self {
            transaction,
            changes: PendingChanges::new(),
        })
    }

    /// A scope bound to this transaction.
    pub fn scope(&mut self) -> ExecutionScope<'_> {
        ExecutionScope {
            store: self.transaction.as_store(),
            changes: &mut self.changes,
        }
    }

    pub fn pending(&self) -> usize {
        self.changes.len()
    }

    /// Commits the transaction and hands back the events to publish.
    #[instrument(skip(self), fields(pending_events = self.changes.len()))]
    pub async fn commit(self) -> StorageResult<Vec<ChangeEvent>> {
        let Self {
            transaction,
            mut changes,
        } = self;
        transaction.commit().await?;
        Ok(changes.take())
    }

    /// Rolls back the transaction, discarding its events.
    pub async fn rollback(self) -> StorageResult<()> {
        let Self {
            transaction,
            mut changes,
        } = self;
        let discarded = changes.discard();
        debug!(discarded_events = discarded, "changeset events discarded");
        transaction.rollback().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odata_domain::ChangeType;
    use odata_storage::MemoryDataStore;
    use serde_json::json;

    #[test]
    fn test_query_options_parse() {
        let options = QueryOptions::parse(Some("$top=2&$skip=1&$filter=Name%20eq%20'x'")).unwrap();
        assert_eq!(options.top, Some(2));
        assert_eq!(options.skip, Some(1));
        assert_eq!(options.get("$filter"), Some("Name eq 'x'"));
        assert_eq!(QueryOptions::parse(None).unwrap(), QueryOptions::default());
    }

    #[test]
    fn test_query_options_reject_bad_top() {
        let err = QueryOptions::parse(Some("$top=-1")).unwrap_err();
        assert!(err.to_string().contains("$top"));
    }

    #[test]
    fn test_batch_part_context_keeps_claims() {
        let mut outer = RequestContext::new(Some("req-1".to_string()));
        outer.merge_claims(BTreeMap::from([("user".to_string(), "ada".to_string())]));
        outer.type_cast = Some("Demo.Person".to_string());

        let part = outer.for_batch_part(true);
        assert!(part.in_batch);
        assert!(part.in_changeset);
        assert_eq!(part.claim("user"), Some("ada"));
        assert!(part.type_cast.is_none());
        assert_eq!(part.request_id.as_deref(), Some("req-1"));
    }

    #[tokio::test]
    async fn test_transaction_context_commit_returns_events() {
        let store = MemoryDataStore::with_entity_sets(["People"]);
        let mut tx = TransactionContext::begin(&store).await.unwrap();
        {
            let mut scope = tx.scope();
            let record = json!({"ID": 1}).as_object().cloned().unwrap();
            scope.store.insert("People", "1", record).await.unwrap();
            scope.record(ChangeEvent::new("People", "1", ChangeType::Added, None));
        }
        assert_eq!(tx.pending(), 1);
        assert_eq!(store.count("People").await.unwrap(), 0);

        let events = tx.commit().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(store.count("People").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_transaction_context_rollback_discards() {
        let store = MemoryDataStore::with_entity_sets(["People"]);
        let mut tx = TransactionContext::begin(&store).await.unwrap();
        {
            let scope = tx.scope();
            let record = json!({"ID": 1}).as_object().cloned().unwrap();
            scope.store.insert("People", "1", record).await.unwrap();
        }
        tx.rollback().await.unwrap();
        assert_eq!(store.count("People").await.unwrap(), 0);
    }
}
