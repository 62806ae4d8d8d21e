//! Batch types for the dispatch lifecycle.
//!
//! A batch moves through `YetToStart -> Triggered -> Completed` using the typestate
//! pattern: each state is its own type, and the only way to reach the next one is
//! through the transition methods in `transitions.rs`, which persist the new state
//! to the [`Registry`](crate::registry::Registry).
//!
//! [`AnyBatch`] holds a batch in whatever state it is in, for storage and queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::queue::IntakeEntry;
use crate::types::{ItemId, Priority, RequestId};

mod transitions;

/// Unique identifier for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for BatchId {
    fn from(uuid: Uuid) -> Self {
        BatchId(uuid)
    }
}

impl std::ops::Deref for BatchId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Marker trait for valid batch states.
pub trait BatchState: Send + Sync {}

/// A batch of up to `batch_size` ids, possibly drawn from several requests.
#[derive(Debug, Clone)]
pub struct Batch<T: BatchState> {
    /// The current state of the batch.
    pub state: T,
    /// Immutable contents of the batch.
    pub data: BatchData,
}

/// The part of a batch that never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchData {
    pub id: BatchId,
    /// Items in drain order
    pub items: Vec<BatchItem>,
    pub created_at: DateTime<Utc>,
}

impl BatchData {
    /// Distinct requests contributing to this batch, in order of first appearance.
    pub fn request_ids(&self) -> Vec<RequestId> {
        let mut seen = Vec::new();
        for item in &self.items {
            if !seen.contains(&item.request_id) {
                seen.push(item.request_id);
            }
        }
        seen
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One id placed in a batch, together with the request it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub request_id: RequestId,
    pub id: ItemId,
    pub priority: Priority,
}

impl From<&IntakeEntry> for BatchItem {
    fn from(entry: &IntakeEntry) -> Self {
        Self {
            request_id: entry.request_id,
            id: entry.id,
            priority: entry.priority,
        }
    }
}

// ============================================================================
// Batch States
// ============================================================================

/// Batch has been formed from the intake queues but no call has started.
#[derive(Debug, Clone)]
pub struct YetToStart {}

impl BatchState for YetToStart {}

/// External calls for the batch are in flight.
#[derive(Debug, Clone)]
pub struct Triggered {
    pub triggered_at: DateTime<Utc>,
}

impl BatchState for Triggered {}

/// Every call of the batch has resolved. Terminal.
#[derive(Debug, Clone)]
pub struct Completed {
    pub triggered_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// One result per item, in item order
    pub results: Vec<ItemResult>,
}

impl BatchState for Completed {}

/// Outcome of one external call attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Success,
    Failure { error: String },
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Success)
    }
}

/// Result recorded for one item of a completed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResult {
    pub request_id: RequestId,
    pub id: ItemId,
    pub outcome: ItemOutcome,
}

/// Flat status of a batch, used in queries and update events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    YetToStart,
    Triggered,
    Completed,
}

// ============================================================================
// Unified Batch Representation
// ============================================================================

/// Enum that can hold a batch in any state.
#[derive(Debug, Clone)]
pub enum AnyBatch {
    YetToStart(Batch<YetToStart>),
    Triggered(Batch<Triggered>),
    Completed(Batch<Completed>),
}

impl AnyBatch {
    pub fn id(&self) -> BatchId {
        self.data().id
    }

    pub fn data(&self) -> &BatchData {
        match self {
            AnyBatch::YetToStart(b) => &b.data,
            AnyBatch::Triggered(b) => &b.data,
            AnyBatch::Completed(b) => &b.data,
        }
    }

    pub fn status(&self) -> BatchStatus {
        match self {
            AnyBatch::YetToStart(_) => BatchStatus::YetToStart,
            AnyBatch::Triggered(_) => BatchStatus::Triggered,
            AnyBatch::Completed(_) => BatchStatus::Completed,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, AnyBatch::Completed(_))
    }

    pub fn triggered_at(&self) -> Option<DateTime<Utc>> {
        match self {
            AnyBatch::YetToStart(_) => None,
            AnyBatch::Triggered(b) => Some(b.state.triggered_at),
            AnyBatch::Completed(b) => Some(b.state.triggered_at),
        }
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            AnyBatch::Completed(b) => Some(b.state.completed_at),
            _ => None,
        }
    }

    pub fn results(&self) -> Option<&[ItemResult]> {
        match self {
            AnyBatch::Completed(b) => Some(&b.state.results),
            _ => None,
        }
    }

    /// View of this batch restricted to the items of one request.
    pub fn summary_for(&self, request_id: RequestId) -> BatchSummary {
        let data = self.data();
        BatchSummary {
            batch_id: data.id,
            ids: data
                .items
                .iter()
                .filter(|item| item.request_id == request_id)
                .map(|item| item.id)
                .collect(),
            status: self.status(),
            created_at: data.created_at,
            triggered_at: self.triggered_at(),
            completed_at: self.completed_at(),
            results: self.results().map(|results| {
                results
                    .iter()
                    .filter(|r| r.request_id == request_id)
                    .cloned()
                    .collect()
            }),
        }
    }
}

impl From<Batch<YetToStart>> for AnyBatch {
    fn from(b: Batch<YetToStart>) -> Self {
        AnyBatch::YetToStart(b)
    }
}

impl From<Batch<Triggered>> for AnyBatch {
    fn from(b: Batch<Triggered>) -> Self {
        AnyBatch::Triggered(b)
    }
}

impl From<Batch<Completed>> for AnyBatch {
    fn from(b: Batch<Completed>) -> Self {
        AnyBatch::Completed(b)
    }
}

/// Snapshot of a batch as seen from one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub batch_id: BatchId,
    /// The request's own ids in this batch, in drain order
    pub ids: Vec<ItemId>,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
    pub triggered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Present once the batch is completed
    pub results: Option<Vec<ItemResult>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(request_id: RequestId, id: ItemId, priority: Priority) -> BatchItem {
        BatchItem {
            request_id,
            id,
            priority,
        }
    }

    #[test]
    fn test_request_ids_are_distinct_in_first_seen_order() {
        let a = RequestId::new();
        let b = RequestId::new();
        let batch = Batch::new(vec![
            item(a, 1, Priority::High),
            item(b, 2, Priority::Medium),
            item(a, 3, Priority::High),
        ]);
        assert_eq!(batch.data.request_ids(), vec![a, b]);
        assert_eq!(batch.data.len(), 3);
    }

    #[test]
    fn test_summary_filters_to_request() {
        let a = RequestId::new();
        let b = RequestId::new();
        let batch: AnyBatch = Batch::new(vec![
            item(a, 9, Priority::High),
            item(b, 4, Priority::Medium),
            item(b, 5, Priority::Medium),
        ])
        .into();

        let summary = batch.summary_for(b);
        assert_eq!(summary.ids, vec![4, 5]);
        assert_eq!(summary.status, BatchStatus::YetToStart);
        assert!(summary.results.is_none());
        assert!(summary.triggered_at.is_none());
    }

    #[test]
    fn test_item_outcome_serde() {
        let failure = ItemOutcome::Failure {
            error: "boom".to_string(),
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["error"], "boom");

        let json = serde_json::to_value(ItemOutcome::Success).unwrap();
        assert_eq!(json["status"], "success");
    }

    #[test]
    fn test_batch_status_ordering_follows_lifecycle() {
        assert!(BatchStatus::YetToStart < BatchStatus::Triggered);
        assert!(BatchStatus::Triggered < BatchStatus::Completed);
    }
}
