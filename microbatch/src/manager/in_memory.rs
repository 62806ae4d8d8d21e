//! In-memory implementation of IngestManager.
//!
//! Combines the intake queues, the registry and the dispatcher into a complete
//! single-process scheduler. Nothing survives a restart.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::Stream;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::call::ExternalCall;
use crate::dispatcher::{update_stream, BatchUpdate, Dispatcher, DispatcherConfig};
use crate::error::{Result, SchedulerError};
use crate::queue::{QueueDepth, SharedIntake};
use crate::registry::{Progress, Registry, RequestView};
use crate::types::{RequestId, RequestRecord, RequestStatus};

use super::idempotency::{self, IdempotencyIndex};
use super::{IngestManager, Submission, SubmitOutcome};

/// In-memory implementation of the IngestManager trait.
///
/// # Example
/// ```ignore
/// use microbatch::{InMemoryIngestManager, SimulatedCall, DispatcherConfig};
///
/// let call = Arc::new(SimulatedCall::new(0.7, Duration::from_millis(100), Duration::from_secs(1)));
/// let manager = InMemoryIngestManager::new(call, DispatcherConfig::default(), Duration::from_secs(300));
///
/// let handle = manager.run(shutdown.clone())?;
/// manager.submit(Submission::new(vec![1, 2, 3], Priority::Medium)).await?;
/// ```
pub struct InMemoryIngestManager<C: ExternalCall> {
    intake: Arc<SharedIntake>,
    registry: Arc<Registry>,
    dispatcher: Arc<Dispatcher<C>>,
    /// Held across lookup, registration and enqueue so identical concurrent
    /// submissions resolve to one request
    idempotency: Mutex<IdempotencyIndex>,
    updates_tx: broadcast::Sender<BatchUpdate>,
    running: Arc<AtomicBool>,
}

impl<C: ExternalCall + 'static> InMemoryIngestManager<C> {
    /// Create a new in-memory manager.
    ///
    /// # Arguments
    /// * `call` - External call every dispatched id goes through
    /// * `config` - Dispatcher configuration (batch size, tick interval, timeouts)
    /// * `idempotency_window` - How long a submission fingerprint is remembered
    pub fn new(call: Arc<C>, config: DispatcherConfig, idempotency_window: Duration) -> Self {
        // Three events per batch
        let (updates_tx, _) = broadcast::channel(1024);
        let intake = Arc::new(SharedIntake::new());
        let registry = Arc::new(Registry::new());
        let dispatcher = Arc::new(Dispatcher::new(
            intake.clone(),
            registry.clone(),
            call,
            config,
            updates_tx.clone(),
        ));

        Self {
            intake,
            registry,
            dispatcher,
            idempotency: Mutex::new(IdempotencyIndex::new(idempotency_window)),
            updates_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle to the dispatcher, for driving ticks by hand.
    pub fn dispatcher(&self) -> &Arc<Dispatcher<C>> {
        &self.dispatcher
    }

    fn validate(submission: &Submission) -> Result<()> {
        if submission.ids.is_empty() {
            return Err(SchedulerError::validation("ids must not be empty"));
        }
        if let Some(position) = submission.ids.iter().position(|&id| id == 0) {
            return Err(SchedulerError::validation(format!(
                "ids must be positive integers (found 0 at position {position})"
            )));
        }
        if let Some(key) = &submission.idempotency_key {
            if key.trim().is_empty() {
                return Err(SchedulerError::validation("idempotency_key must not be empty"));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<C: ExternalCall + 'static> IngestManager for InMemoryIngestManager<C> {
    #[tracing::instrument(skip(self, submission), fields(count = submission.ids.len(), priority = %submission.priority))]
    async fn submit(&self, submission: Submission) -> Result<SubmitOutcome> {
        Self::validate(&submission)?;

        let fingerprint = match &submission.idempotency_key {
            Some(key) => idempotency::explicit_key(key),
            None => idempotency::fingerprint(&submission.ids, submission.priority),
        };

        let mut index = self.idempotency.lock();

        if let Some(existing) = index.lookup(&fingerprint) {
            // The registry may have been reset underneath the index
            if let Ok(status) = self.registry.project_request_status(existing) {
                tracing::info!(request_id = %existing, "Duplicate submission resolved to existing request");
                return Ok(SubmitOutcome {
                    request_id: existing,
                    created: false,
                    status,
                });
            }
        }

        let record = RequestRecord::new(submission.ids, submission.priority, fingerprint.clone());
        let request_id = record.id;
        let priority = record.priority;
        let ids = record.ids.clone();

        self.registry.insert_request(record)?;
        let enqueued = self.intake.enqueue(request_id, priority, &ids);
        index.record(fingerprint, request_id);
        drop(index);

        tracing::info!(request_id = %request_id, enqueued, "Ingestion request accepted");

        Ok(SubmitOutcome {
            request_id,
            created: true,
            status: RequestStatus::YetToStart,
        })
    }

    async fn get_status(&self, request_id: RequestId) -> Result<RequestView> {
        self.registry.request_view(request_id)
    }

    async fn get_progress(&self, request_id: RequestId) -> Result<Progress> {
        self.registry.progress(request_id)
    }

    fn active_requests(&self) -> usize {
        self.registry.active_request_count()
    }

    fn queue_depth(&self) -> QueueDepth {
        self.intake.depth()
    }

    fn subscribe(
        &self,
        request_filter: Option<Vec<RequestId>>,
    ) -> Pin<Box<dyn Stream<Item = BatchUpdate> + Send>> {
        update_stream(self.updates_tx.subscribe(), request_filter)
    }

    fn run(&self, shutdown: CancellationToken) -> Result<JoinHandle<Result<()>>> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        tracing::info!("Starting dispatcher");

        let dispatcher = self.dispatcher.clone();
        let running = self.running.clone();
        let handle = tokio::spawn(async move {
            let _guard = scopeguard::guard(running, |running| {
                running.store(false, Ordering::SeqCst);
            });
            dispatcher.run(shutdown).await
        });

        tracing::info!("Dispatcher spawned successfully");

        Ok(handle)
    }

    /// Waits for the batch in flight to complete, so the dispatcher never sees its
    /// batch disappear mid-cycle.
    async fn reset(&self) {
        let _paused = self.dispatcher.pause().await;
        let mut index = self.idempotency.lock();
        self.registry.clear();
        self.intake.clear();
        index.clear();
        tracing::info!("Scheduler state reset");
    }
}
