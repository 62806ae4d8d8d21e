use chrono::Utc;

use crate::error::{Result, SchedulerError};
use crate::registry::Registry;

use super::{Batch, BatchData, BatchId, BatchItem, Completed, ItemResult, Triggered, YetToStart};

impl Batch<YetToStart> {
    /// Form a new, unstarted batch from drained items.
    pub fn new(items: Vec<BatchItem>) -> Self {
        Batch {
            state: YetToStart {},
            data: BatchData {
                id: BatchId::new(),
                items,
                created_at: Utc::now(),
            },
        }
    }

    pub fn trigger(self, registry: &Registry) -> Result<Batch<Triggered>> {
        let batch = Batch {
            data: self.data,
            state: Triggered {
                triggered_at: Utc::now(),
            },
        };
        registry.persist(&batch)?;
        Ok(batch)
    }
}

impl Batch<Triggered> {
    /// Record the outcome of every call and close the batch.
    ///
    /// `results` must line up one-to-one with the batch items.
    pub fn complete(self, results: Vec<ItemResult>, registry: &Registry) -> Result<Batch<Completed>> {
        if results.len() != self.data.items.len() {
            return Err(SchedulerError::InvariantViolation(format!(
                "batch {} has {} items but {} results",
                self.data.id,
                self.data.items.len(),
                results.len()
            )));
        }
        for (item, result) in self.data.items.iter().zip(&results) {
            if item.id != result.id || item.request_id != result.request_id {
                return Err(SchedulerError::InvariantViolation(format!(
                    "batch {} result for id {} does not match item {}",
                    self.data.id, result.id, item.id
                )));
            }
        }

        let batch = Batch {
            data: self.data,
            state: Completed {
                triggered_at: self.state.triggered_at,
                completed_at: Utc::now(),
                results,
            },
        };
        registry.persist(&batch)?;
        Ok(batch)
    }
}
