//! Change events and the pending event queue.
//!
//! Handlers record a [`ChangeEvent`] for every successful write into a
//! [`PendingChanges`] queue owned by the caller. Outside a changeset the
//! queue is flushed as soon as the write returns; inside a changeset it is
//! flushed only after the transaction commits and discarded on rollback.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of change applied to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Updated,
    Deleted,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Added => "added",
            ChangeType::Updated => "updated",
            ChangeType::Deleted => "deleted",
        }
    }
}

/// A single entity change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub entity_set: String,
    pub key: String,
    pub change_type: ChangeType,
    /// Entity state after the change; `None` for deletes.
    pub entity: Option<Value>,
    pub recorded_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(
        entity_set: impl Into<String>,
        key: impl Into<String>,
        change_type: ChangeType,
        entity: Option<Value>,
    ) -> Self {
        Self {
            entity_set: entity_set.into(),
            key: key.into(),
            change_type,
            entity,
            recorded_at: Utc::now(),
        }
    }
}

/// Events recorded during one unit of work, not yet published.
///
/// Owned by exactly one executor invocation and passed down by `&mut`.
#[derive(Debug, Default)]
pub struct PendingChanges {
    events: Vec<ChangeEvent>,
}

impl PendingChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: ChangeEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[ChangeEvent] {
        &self.events
    }

    /// Takes all queued events, leaving the queue empty.
    pub fn take(&mut self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.events)
    }

    /// Drops all queued events, returning how many were discarded.
    pub fn discard(&mut self) -> usize {
        let dropped = self.events.len();
        self.events.clear();
        dropped
    }
}

/// Receives committed change events.
#[async_trait]
pub trait ChangeTracker: Send + Sync + 'static {
    /// Publishes events in the order they were recorded.
    async fn publish(&self, events: Vec<ChangeEvent>);
}

/// Default capacity of a [`ChangeLog`].
pub const DEFAULT_CHANGE_LOG_CAPACITY: usize = 10_000;

/// In-memory change tracker keeping the most recent events.
#[derive(Debug)]
pub struct ChangeLog {
    capacity: usize,
    events: Mutex<VecDeque<ChangeEvent>>,
}

impl Default for ChangeLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CHANGE_LOG_CAPACITY)
    }
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: Mutex::new(VecDeque::new()),
        }
    }

    /// Snapshot of the retained events, oldest first.
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[async_trait]
impl ChangeTracker for ChangeLog {
    async fn publish(&self, events: Vec<ChangeEvent>) {
        if events.is_empty() {
            return;
        }
        let mut log = self.events.lock();
        for event in events {
            tracing::debug!(
                target: "odata::events",
                entity_set = %event.entity_set,
                key = %event.key,
                change = event.change_type.as_str(),
                "change published"
            );
            if log.len() == self.capacity {
                log.pop_front();
            }
            log.push_back(event);
        }
    }
}
