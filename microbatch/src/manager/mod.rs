//! Main trait for the ingestion scheduler.
//!
//! This module defines the `IngestManager` trait, the interface the HTTP layer (and any
//! other caller) uses to submit ids, query request status, and run the dispatcher.

use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::Stream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::BatchUpdate;
use crate::error::Result;
use crate::queue::QueueDepth;
use crate::registry::{Progress, RequestView};
use crate::types::{ItemId, Priority, RequestId, RequestStatus};

pub mod idempotency;
pub mod in_memory;

/// A submission of ids at one priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub ids: Vec<ItemId>,
    pub priority: Priority,
    /// Caller-chosen key; when absent, duplicates are detected by content
    pub idempotency_key: Option<String>,
}

impl Submission {
    pub fn new(ids: Vec<ItemId>, priority: Priority) -> Self {
        Self {
            ids,
            priority,
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// What happened to a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub request_id: RequestId,
    /// False when the submission resolved to an existing request
    pub created: bool,
    pub status: RequestStatus,
}

/// Main trait for the ingestion scheduler.
///
/// # Example
/// ```ignore
/// let manager = InMemoryIngestManager::new(call, DispatcherConfig::default(), window);
/// let shutdown = CancellationToken::new();
/// let handle = manager.run(shutdown.clone())?;
///
/// let outcome = manager.submit(Submission::new(vec![1, 2, 3], Priority::High)).await?;
/// let view = manager.get_status(outcome.request_id).await?;
///
/// shutdown.cancel();
/// handle.await??;
/// ```
#[async_trait]
pub trait IngestManager: Send + Sync {
    /// Accept a submission.
    ///
    /// Validates it, resolves duplicates inside the idempotency window to the existing
    /// request, and otherwise registers a new request and enqueues its ids.
    ///
    /// # Errors
    /// - `Validation` if `ids` is empty, contains 0, or the idempotency key is empty.
    ///   Nothing is enqueued.
    async fn submit(&self, submission: Submission) -> Result<SubmitOutcome>;

    /// Snapshot of a request: record, derived status and batches in creation order.
    ///
    /// # Errors
    /// - `NotFound` if the request is unknown.
    async fn get_status(&self, request_id: RequestId) -> Result<RequestView>;

    /// Per-id processing counters for a request.
    async fn get_progress(&self, request_id: RequestId) -> Result<Progress>;

    /// Number of requests that have not completed.
    fn active_requests(&self) -> usize;

    fn queue_depth(&self) -> QueueDepth;

    /// Stream of batch updates, optionally restricted to batches touching the given
    /// requests. The stream ends when the manager is dropped.
    fn subscribe(
        &self,
        request_filter: Option<Vec<RequestId>>,
    ) -> Pin<Box<dyn Stream<Item = BatchUpdate> + Send>>;

    /// Spawn the dispatcher loop. It runs until `shutdown` is cancelled.
    ///
    /// # Errors
    /// Returns an error if the dispatcher is already running.
    fn run(&self, shutdown: CancellationToken) -> Result<JoinHandle<Result<()>>>;

    /// Forget every request, batch, queued id and idempotency entry.
    ///
    /// A batch already in flight runs to completion before anything is cleared.
    async fn reset(&self);
}
