use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::batch::BatchId;

/// An opaque work item submitted for processing.
pub type ItemId = u64;

/// Priority of an ingestion request.
///
/// Variants are declared lowest first so the derived ordering gives
/// `High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// All priorities, highest first. This is the order the dispatcher drains queues in.
    pub const DESCENDING: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "HIGH" => Ok(Priority::High),
            "MEDIUM" => Ok(Priority::Medium),
            "LOW" => Ok(Priority::Low),
            other => Err(format!("Priority must be HIGH, MEDIUM, or LOW, got '{other}'")),
        }
    }
}

/// A unique identifier for an ingestion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Create a new random request ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Status of a request, derived from the statuses of its batches. Ordered along
/// the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// No batch holding any of the request's ids has been triggered yet
    YetToStart,
    /// At least one batch has been triggered, but not every id is done
    Triggered,
    /// Every id has been placed in a batch and every such batch is completed
    Completed,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed)
    }
}

/// One accepted submission.
///
/// Created unstarted by the submission gateway; afterwards only the dispatcher
/// touches it, appending batch references as it coalesces the request's ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    pub id: RequestId,
    /// Ids in original submission order
    pub ids: Vec<ItemId>,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    /// Idempotency key the request was registered under
    pub fingerprint: String,
    /// Batches created on behalf of this request, in creation order
    pub batch_ids: Vec<BatchId>,
    /// How many of `ids` have been placed in a batch so far
    pub dispatched: usize,
}

impl RequestRecord {
    pub fn new(ids: Vec<ItemId>, priority: Priority, fingerprint: String) -> Self {
        Self {
            id: RequestId::new(),
            ids,
            priority,
            created_at: Utc::now(),
            fingerprint,
            batch_ids: Vec::new(),
            dispatched: 0,
        }
    }

    /// Whether every id of the request has left the intake queues.
    pub fn fully_dispatched(&self) -> bool {
        self.dispatched >= self.ids.len()
    }
}
