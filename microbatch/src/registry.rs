//! Authoritative store of requests and batches.
//!
//! Everything lives in memory behind one read-write lock. The dispatcher is the only
//! writer of batch state; any number of status queries read concurrently and get
//! cloned snapshots. Each write applies one lifecycle transition, so a reader never
//! observes a batch state out of order.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;

use crate::batch::{AnyBatch, Batch, BatchId, BatchState, BatchStatus, BatchSummary, YetToStart};
use crate::error::{Result, SchedulerError};
use crate::types::{RequestId, RequestRecord, RequestStatus};

#[derive(Debug, Default)]
struct RegistryInner {
    requests: HashMap<RequestId, RequestRecord>,
    batches: HashMap<BatchId, AnyBatch>,
}

impl RegistryInner {
    fn request(&self, id: RequestId) -> Result<&RequestRecord> {
        self.requests
            .get(&id)
            .ok_or_else(|| SchedulerError::request_not_found(id.as_uuid()))
    }

    fn batches_of<'a>(&'a self, record: &'a RequestRecord) -> impl Iterator<Item = &'a AnyBatch> + 'a {
        record
            .batch_ids
            .iter()
            .filter_map(move |batch_id| self.batches.get(batch_id))
    }

    fn derive_status(&self, record: &RequestRecord) -> RequestStatus {
        let mut started = false;
        let mut all_completed = true;
        for batch in self.batches_of(record) {
            started |= batch.status() != BatchStatus::YetToStart;
            all_completed &= batch.is_completed();
        }

        if !started {
            RequestStatus::YetToStart
        } else if all_completed && record.fully_dispatched() {
            RequestStatus::Completed
        } else {
            RequestStatus::Triggered
        }
    }

    fn progress_of(&self, record: &RequestRecord) -> Progress {
        let (mut processed, mut failed) = (0, 0);
        for results in self.batches_of(record).filter_map(AnyBatch::results) {
            for result in results.iter().filter(|r| r.request_id == record.id) {
                if result.outcome.is_success() {
                    processed += 1;
                } else {
                    failed += 1;
                }
            }
        }

        let total = record.ids.len();
        let percent = if total == 0 {
            100
        } else {
            ((processed + failed) * 100 / total) as u8
        };
        Progress {
            total,
            processed,
            failed,
            percent,
        }
    }
}

/// Snapshot of one request: its record, derived status and batches.
#[derive(Debug, Clone)]
pub struct RequestView {
    pub record: RequestRecord,
    pub status: RequestStatus,
    /// Batches in creation order, restricted to this request's ids
    pub batches: Vec<BatchSummary>,
    pub progress: Progress,
}

/// Per-id processing counters for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    /// Share of ids with a recorded outcome, 0 to 100
    pub percent: u8,
}

/// In-memory registry of requests and batches.
#[derive(Debug, Default)]
pub struct Registry {
    inner: RwLock<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new, unstarted request.
    pub fn insert_request(&self, record: RequestRecord) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.requests.contains_key(&record.id) {
            return Err(SchedulerError::InvariantViolation(format!(
                "request {} registered twice",
                record.id
            )));
        }
        inner.requests.insert(record.id, record);
        Ok(())
    }

    pub fn get_request(&self, id: RequestId) -> Result<RequestRecord> {
        self.inner.read().request(id).cloned()
    }

    pub fn get_batch(&self, id: BatchId) -> Result<AnyBatch> {
        self.inner
            .read()
            .batches
            .get(&id)
            .cloned()
            .ok_or_else(|| SchedulerError::batch_not_found(id.0))
    }

    /// Store a freshly formed batch and link it to every contributing request.
    ///
    /// Each request gets the batch reference appended once, however many of its ids
    /// the batch holds.
    pub fn create_batch(&self, batch: &Batch<YetToStart>) -> Result<()> {
        let mut inner = self.inner.write();
        let batch_id = batch.data.id;

        if inner.batches.contains_key(&batch_id) {
            return Err(SchedulerError::InvariantViolation(format!(
                "batch {batch_id} created twice"
            )));
        }
        let mut contributions = Vec::new();
        for request_id in batch.data.request_ids() {
            let record = inner.requests.get(&request_id).ok_or_else(|| {
                SchedulerError::InvariantViolation(format!(
                    "batch {batch_id} references unknown request {request_id}"
                ))
            })?;
            let count = batch
                .data
                .items
                .iter()
                .filter(|item| item.request_id == request_id)
                .count();
            if record.dispatched + count > record.ids.len() {
                return Err(SchedulerError::InvariantViolation(format!(
                    "request {request_id} would have {} of {} ids dispatched",
                    record.dispatched + count,
                    record.ids.len()
                )));
            }
            contributions.push((request_id, count));
        }

        for (request_id, count) in contributions {
            if let Some(record) = inner.requests.get_mut(&request_id) {
                record.batch_ids.push(batch_id);
                record.dispatched += count;
            }
        }

        inner.batches.insert(batch_id, batch.clone().into());
        Ok(())
    }

    /// Persist a batch state transition.
    ///
    /// Only a single forward step is accepted (`yet_to_start -> triggered`,
    /// `triggered -> completed`); anything else is an invariant violation.
    pub fn persist<T: BatchState + Clone>(&self, batch: &Batch<T>) -> Result<()>
    where
        AnyBatch: From<Batch<T>>,
    {
        let next: AnyBatch = batch.clone().into();
        let mut inner = self.inner.write();

        let existing = inner
            .batches
            .get_mut(&batch.data.id)
            .ok_or_else(|| SchedulerError::batch_not_found(batch.data.id.0))?;

        let expected = match existing.status() {
            BatchStatus::YetToStart => Some(BatchStatus::Triggered),
            BatchStatus::Triggered => Some(BatchStatus::Completed),
            BatchStatus::Completed => None,
        };
        if expected != Some(next.status()) {
            return Err(SchedulerError::InvariantViolation(format!(
                "batch {} cannot move from {:?} to {:?}",
                batch.data.id,
                existing.status(),
                next.status()
            )));
        }

        *existing = next;
        Ok(())
    }

    /// Batches holding any of the request's ids, in creation order.
    pub fn batch_statuses(&self, request_id: RequestId) -> Result<Vec<BatchSummary>> {
        let inner = self.inner.read();
        let record = inner.request(request_id)?;
        Ok(inner
            .batches_of(record)
            .map(|batch| batch.summary_for(request_id))
            .collect())
    }

    pub fn project_request_status(&self, request_id: RequestId) -> Result<RequestStatus> {
        let inner = self.inner.read();
        let record = inner.request(request_id)?;
        Ok(inner.derive_status(record))
    }

    /// Record, derived status, batch summaries and progress taken under a single read lock.
    pub fn request_view(&self, request_id: RequestId) -> Result<RequestView> {
        let inner = self.inner.read();
        let record = inner.request(request_id)?;
        Ok(RequestView {
            record: record.clone(),
            status: inner.derive_status(record),
            batches: inner
                .batches_of(record)
                .map(|batch| batch.summary_for(request_id))
                .collect(),
            progress: inner.progress_of(record),
        })
    }

    pub fn progress(&self, request_id: RequestId) -> Result<Progress> {
        let inner = self.inner.read();
        let record = inner.request(request_id)?;
        Ok(inner.progress_of(record))
    }

    /// Number of requests that have not reached `completed`.
    pub fn active_request_count(&self) -> usize {
        let inner = self.inner.read();
        inner
            .requests
            .values()
            .filter(|record| !inner.derive_status(record).is_terminal())
            .count()
    }

    pub fn request_count(&self) -> usize {
        self.inner.read().requests.len()
    }

    pub fn batch_count(&self) -> usize {
        self.inner.read().batches.len()
    }

    /// Forget every request and batch.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.requests.clear();
        inner.batches.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchItem, ItemOutcome, ItemResult, Triggered};
    use crate::types::{ItemId, Priority};
    use rstest::{fixture, rstest};

    #[fixture]
    fn registry() -> Registry {
        Registry::new()
    }

    fn register(registry: &Registry, ids: Vec<ItemId>, priority: Priority) -> RequestId {
        let record = RequestRecord::new(ids, priority, "fp".to_string());
        let id = record.id;
        registry.insert_request(record).unwrap();
        id
    }

    fn batch_of(items: &[(RequestId, ItemId)]) -> Batch<YetToStart> {
        Batch::new(
            items
                .iter()
                .map(|&(request_id, id)| BatchItem {
                    request_id,
                    id,
                    priority: Priority::Medium,
                })
                .collect(),
        )
    }

    fn complete_all(batch: Batch<Triggered>, failing: &[ItemId], registry: &Registry) {
        let results = batch
            .data
            .items
            .iter()
            .map(|item| ItemResult {
                request_id: item.request_id,
                id: item.id,
                outcome: if failing.contains(&item.id) {
                    ItemOutcome::Failure {
                        error: "boom".to_string(),
                    }
                } else {
                    ItemOutcome::Success
                },
            })
            .collect();
        batch.complete(results, registry).unwrap();
    }

    #[rstest]
    fn test_unknown_request_is_not_found(registry: Registry) {
        let err = registry.get_request(RequestId::new()).unwrap_err();
        assert!(matches!(err, SchedulerError::NotFound { .. }));
        assert!(registry.batch_statuses(RequestId::new()).is_err());
        assert!(registry.project_request_status(RequestId::new()).is_err());
    }

    #[rstest]
    fn test_new_request_is_yet_to_start(registry: Registry) {
        let id = register(&registry, vec![1, 2, 3], Priority::High);
        assert_eq!(registry.project_request_status(id).unwrap(), RequestStatus::YetToStart);
        assert!(registry.batch_statuses(id).unwrap().is_empty());
        assert_eq!(registry.active_request_count(), 1);
    }

    #[rstest]
    fn test_status_follows_batches(registry: Registry) {
        let id = register(&registry, vec![1, 2, 3, 4], Priority::Low);

        let first = batch_of(&[(id, 1), (id, 2), (id, 3)]);
        registry.create_batch(&first).unwrap();
        assert_eq!(registry.project_request_status(id).unwrap(), RequestStatus::YetToStart);

        let first = first.trigger(&registry).unwrap();
        assert_eq!(registry.project_request_status(id).unwrap(), RequestStatus::Triggered);

        complete_all(first, &[], &registry);
        // id 4 is still queued
        assert_eq!(registry.project_request_status(id).unwrap(), RequestStatus::Triggered);

        let second = batch_of(&[(id, 4)]);
        registry.create_batch(&second).unwrap();
        let second = second.trigger(&registry).unwrap();
        complete_all(second, &[4], &registry);

        assert_eq!(registry.project_request_status(id).unwrap(), RequestStatus::Completed);
        assert_eq!(registry.active_request_count(), 0);
    }

    #[rstest]
    fn test_shared_batch_is_linked_once_per_request(registry: Registry) {
        let high = register(&registry, vec![9], Priority::High);
        let medium = register(&registry, vec![4, 5], Priority::Medium);

        let batch = batch_of(&[(high, 9), (medium, 4), (medium, 5)]);
        let batch_id = batch.data.id;
        registry.create_batch(&batch).unwrap();

        assert_eq!(registry.get_request(high).unwrap().batch_ids, vec![batch_id]);
        assert_eq!(registry.get_request(medium).unwrap().batch_ids, vec![batch_id]);
        assert_eq!(registry.get_request(medium).unwrap().dispatched, 2);

        let summaries = registry.batch_statuses(medium).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].ids, vec![4, 5]);
    }

    #[rstest]
    fn test_create_batch_rejects_unknown_request(registry: Registry) {
        let err = registry
            .create_batch(&batch_of(&[(RequestId::new(), 1)]))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvariantViolation(_)));
        assert_eq!(registry.batch_count(), 0);
    }

    #[rstest]
    fn test_create_batch_rejects_over_dispatch(registry: Registry) {
        let id = register(&registry, vec![1], Priority::High);
        registry.create_batch(&batch_of(&[(id, 1)])).unwrap();

        let err = registry.create_batch(&batch_of(&[(id, 1)])).unwrap_err();
        assert!(matches!(err, SchedulerError::InvariantViolation(_)));
    }

    #[rstest]
    fn test_completed_batch_is_immutable(registry: Registry) {
        let id = register(&registry, vec![1], Priority::High);
        let batch = batch_of(&[(id, 1)]);
        registry.create_batch(&batch).unwrap();
        let triggered = batch.trigger(&registry).unwrap();
        let stale = triggered.clone();
        complete_all(triggered, &[], &registry);

        let err = registry.persist(&stale).unwrap_err();
        assert!(matches!(err, SchedulerError::InvariantViolation(_)));
        assert!(registry.get_batch(stale.data.id).unwrap().is_completed());
    }

    #[rstest]
    fn test_progress_counts_outcomes(registry: Registry) {
        let id = register(&registry, vec![1, 2, 3, 4], Priority::Medium);
        let batch = batch_of(&[(id, 1), (id, 2), (id, 3)]);
        registry.create_batch(&batch).unwrap();
        complete_all(batch.trigger(&registry).unwrap(), &[2], &registry);

        let progress = registry.progress(id).unwrap();
        assert_eq!(
            progress,
            Progress {
                total: 4,
                processed: 2,
                failed: 1,
                percent: 75
            }
        );
    }

    #[rstest]
    fn test_request_view_is_consistent(registry: Registry) {
        let id = register(&registry, vec![1], Priority::Low);
        let batch = batch_of(&[(id, 1)]);
        registry.create_batch(&batch).unwrap();
        batch.trigger(&registry).unwrap();

        let view = registry.request_view(id).unwrap();
        assert_eq!(view.status, RequestStatus::Triggered);
        assert_eq!(view.batches.len(), 1);
        assert_eq!(view.batches[0].status, BatchStatus::Triggered);
        assert_eq!(view.record.batch_ids, vec![view.batches[0].batch_id]);
    }

    #[rstest]
    fn test_request_view_progress_matches_status(registry: Registry) {
        let id = register(&registry, vec![1, 2], Priority::High);
        let batch = batch_of(&[(id, 1), (id, 2)]);
        registry.create_batch(&batch).unwrap();
        let triggered = batch.trigger(&registry).unwrap();

        let view = registry.request_view(id).unwrap();
        assert_eq!(view.status, RequestStatus::Triggered);
        assert_eq!(view.progress.percent, 0);

        complete_all(triggered, &[2], &registry);

        let view = registry.request_view(id).unwrap();
        assert_eq!(view.status, RequestStatus::Completed);
        assert_eq!(view.progress, registry.progress(id).unwrap());
        assert_eq!((view.progress.processed, view.progress.failed, view.progress.percent), (1, 1, 100));
    }

    #[rstest]
    fn test_clear_forgets_everything(registry: Registry) {
        let id = register(&registry, vec![1], Priority::Low);
        registry.create_batch(&batch_of(&[(id, 1)])).unwrap();

        registry.clear();
        assert_eq!(registry.request_count(), 0);
        assert_eq!(registry.batch_count(), 0);
        assert!(registry.get_request(id).is_err());
    }
}
