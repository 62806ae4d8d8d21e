//! Tick-driven dispatcher.
//!
//! A single task that, at most once per `batch_delay`, drains up to `batch_size` ids
//! from the intake queues into a new batch, attempts every id concurrently through
//! the [`ExternalCall`], and completes the batch once all attempts have resolved.
//!
//! Ticks never overlap. The next tick is scheduled `batch_delay` after the previous
//! one started, and it cannot begin before the previous batch is completed, so at
//! most one batch is in flight at any time. When the queues are empty the dispatcher
//! idles until the next submission (or the idle poll interval) and then fires as soon
//! as the rate limit allows.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::{broadcast, MutexGuard};
use tokio::time::Instant;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::batch::{Batch, BatchId, BatchItem, BatchStatus, ItemOutcome, ItemResult};
use crate::call::ExternalCall;
use crate::error::{Result, SchedulerError};
use crate::queue::{IntakeEntry, SharedIntake};
use crate::registry::Registry;
use crate::types::{Priority, RequestId};

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Ids per batch
    pub batch_size: usize,

    /// Minimum time between the starts of two consecutive ticks
    pub batch_delay: Duration,

    /// Upper bound on a single external call attempt
    pub call_timeout: Duration,

    /// How long an idle dispatcher waits for a submission before polling the queues again
    pub idle_poll_interval: Duration,

    /// Interval for logging dispatcher status (queue depth, calls in flight).
    /// Set to None to disable periodic status logging
    pub status_log_interval: Option<Duration>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            batch_delay: Duration::from_secs(5),
            call_timeout: Duration::from_secs(3),
            idle_poll_interval: Duration::from_secs(1),
            status_log_interval: Some(Duration::from_secs(5)),
        }
    }
}

/// An update event emitted whenever a batch changes status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchUpdate {
    pub batch_id: BatchId,
    /// Requests with ids in the batch
    pub request_ids: Vec<RequestId>,
    pub status: BatchStatus,
}

/// Turn a broadcast receiver into a stream of updates, optionally filtered to
/// batches touching the given requests.
pub fn update_stream(
    rx: broadcast::Receiver<BatchUpdate>,
    request_ids: Option<Vec<RequestId>>,
) -> Pin<Box<dyn Stream<Item = BatchUpdate> + Send>> {
    match request_ids {
        Some(ids) => {
            let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
                Ok(update) if update.request_ids.iter().any(|id| ids.contains(id)) => Some(update),
                _ => None,
            });
            Box::pin(stream)
        }
        None => {
            let stream = BroadcastStream::new(rx).filter_map(|result| result.ok());
            Box::pin(stream)
        }
    }
}

/// The scheduler core: forms batches from the intake queues and drives them to completion.
pub struct Dispatcher<C>
where
    C: ExternalCall,
{
    intake: Arc<SharedIntake>,
    registry: Arc<Registry>,
    call: Arc<C>,
    config: DispatcherConfig,
    updates_tx: broadcast::Sender<BatchUpdate>,
    calls_in_flight: Arc<AtomicUsize>,
    /// Highest sequence number drained so far, per priority
    watermarks: Mutex<HashMap<Priority, u64>>,
    /// Held for a whole dispatch cycle, from drain to completion
    cycle: tokio::sync::Mutex<()>,
}

impl<C> Dispatcher<C>
where
    C: ExternalCall + 'static,
{
    pub fn new(
        intake: Arc<SharedIntake>,
        registry: Arc<Registry>,
        call: Arc<C>,
        config: DispatcherConfig,
        updates_tx: broadcast::Sender<BatchUpdate>,
    ) -> Self {
        Self {
            intake,
            registry,
            call,
            config,
            updates_tx,
            calls_in_flight: Arc::new(AtomicUsize::new(0)),
            watermarks: Mutex::new(HashMap::new()),
            cycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Wait for the batch in flight (if any) to complete and hold off further ticks
    /// until the returned guard is dropped.
    pub async fn pause(&self) -> MutexGuard<'_, ()> {
        self.cycle.lock().await
    }

    /// Run the dispatch loop until `shutdown` is cancelled.
    ///
    /// A batch already in flight when shutdown is requested runs to completion first.
    /// Returns an error only on a scheduling invariant violation, which stops the loop.
    #[tracing::instrument(skip_all, fields(batch_size = self.config.batch_size))]
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(
            batch_delay_ms = self.config.batch_delay.as_millis() as u64,
            "Dispatcher starting main loop"
        );

        if let Some(interval) = self.config.status_log_interval {
            let intake = self.intake.clone();
            let calls_in_flight = self.calls_in_flight.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = interval.tick() => {
                            let depth = intake.depth();
                            tracing::debug!(
                                queued_high = depth.high,
                                queued_medium = depth.medium,
                                queued_low = depth.low,
                                calls_in_flight = calls_in_flight.load(Ordering::Relaxed),
                                "Dispatcher status"
                            );
                        }
                    }
                }
            });
        }

        let mut next_tick = Instant::now();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep_until(next_tick) => {}
            }

            let started = Instant::now();
            let dispatched = match self.tick().await {
                Ok(dispatched) => dispatched,
                Err(e) => {
                    tracing::error!(error = %e, "Dispatcher tick failed, stopping");
                    return Err(e);
                }
            };

            match dispatched {
                Some(_) => next_tick = started + self.config.batch_delay,
                None => {
                    tracing::trace!("Intake queues empty, idling");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = self.intake.notified() => {}
                        _ = tokio::time::sleep(self.config.idle_poll_interval) => {}
                    }
                }
            }
        }

        tracing::info!("Dispatcher stopped");
        Ok(())
    }

    /// Run one dispatch cycle: drain, create, trigger, attempt, complete.
    ///
    /// Returns the id of the batch that was processed, or `None` if every queue was empty.
    pub async fn tick(&self) -> Result<Option<BatchId>> {
        let _cycle = self.cycle.lock().await;

        let entries = self.intake.drain(self.config.batch_size);
        if entries.is_empty() {
            return Ok(None);
        }
        self.check_invariants(&entries)?;

        let batch = Batch::new(entries.iter().map(BatchItem::from).collect());
        let batch_id = batch.data.id;
        let request_ids = batch.data.request_ids();

        self.registry.create_batch(&batch)?;
        self.broadcast(batch_id, &request_ids, BatchStatus::YetToStart);

        let batch = batch.trigger(&self.registry)?;
        self.broadcast(batch_id, &request_ids, BatchStatus::Triggered);

        tracing::info!(
            batch_id = %batch_id,
            size = batch.data.len(),
            ids = ?batch.data.items.iter().map(|item| item.id).collect::<Vec<_>>(),
            requests = request_ids.len(),
            "Batch triggered"
        );

        let results = self.attempt_all(&batch.data.items).await;
        let failed = results.iter().filter(|r| !r.outcome.is_success()).count();

        batch.complete(results, &self.registry)?;
        self.broadcast(batch_id, &request_ids, BatchStatus::Completed);

        tracing::info!(batch_id = %batch_id, failed, "Batch completed");
        Ok(Some(batch_id))
    }

    /// Attempt every item concurrently. Each attempt is bounded by `call_timeout`;
    /// failures and timeouts are recorded, never retried.
    async fn attempt_all(&self, items: &[BatchItem]) -> Vec<ItemResult> {
        let attempts = items.iter().map(|item| {
            let call = self.call.clone();
            let calls_in_flight = self.calls_in_flight.clone();
            let timeout = self.config.call_timeout;
            let item = *item;

            async move {
                calls_in_flight.fetch_add(1, Ordering::Relaxed);
                let _guard = scopeguard::guard(calls_in_flight, |count| {
                    count.fetch_sub(1, Ordering::Relaxed);
                });

                let outcome = match tokio::time::timeout(timeout, call.attempt(item.id)).await {
                    Ok(Ok(())) => ItemOutcome::Success,
                    Ok(Err(e)) => {
                        tracing::warn!(id = item.id, error = %e, "External call failed");
                        ItemOutcome::Failure {
                            error: e.to_string(),
                        }
                    }
                    Err(_) => {
                        tracing::warn!(
                            id = item.id,
                            timeout_ms = timeout.as_millis() as u64,
                            "External call timed out"
                        );
                        ItemOutcome::Failure {
                            error: format!("timed out after {}ms", timeout.as_millis()),
                        }
                    }
                };

                ItemResult {
                    request_id: item.request_id,
                    id: item.id,
                    outcome,
                }
            }
        });

        join_all(attempts).await
    }

    /// Guard against states that only a scheduling bug could produce.
    fn check_invariants(&self, entries: &[IntakeEntry]) -> Result<()> {
        if entries.len() > self.config.batch_size {
            return Err(SchedulerError::InvariantViolation(format!(
                "drained {} entries for a batch of {}",
                entries.len(),
                self.config.batch_size
            )));
        }

        if entries.windows(2).any(|w| w[0].priority < w[1].priority) {
            return Err(SchedulerError::InvariantViolation(
                "batch drained a lower priority entry ahead of a higher one".to_string(),
            ));
        }

        let mut watermarks = self.watermarks.lock();
        for entry in entries {
            if let Some(&last) = watermarks.get(&entry.priority) {
                if entry.seq <= last {
                    return Err(SchedulerError::InvariantViolation(format!(
                        "entry {} (id {}) drained twice or out of order",
                        entry.seq, entry.id
                    )));
                }
            }
            watermarks.insert(entry.priority, entry.seq);
        }

        Ok(())
    }

    fn broadcast(&self, batch_id: BatchId, request_ids: &[RequestId], status: BatchStatus) {
        // No receivers is fine
        let _ = self.updates_tx.send(BatchUpdate {
            batch_id,
            request_ids: request_ids.to_vec(),
            status,
        });
    }
}
