//! Models for the status endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::batch::{BatchStatus, BatchSummary, ItemOutcome, ItemResult};
use crate::registry::RequestView;
use crate::types::{ItemId, Priority, RequestStatus};

/// Outcome of one id, as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemResultStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ItemResultResponse {
    pub id: ItemId,
    pub status: ItemResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ItemResult> for ItemResultResponse {
    fn from(result: &ItemResult) -> Self {
        let (status, error) = match &result.outcome {
            ItemOutcome::Success => (ItemResultStatus::Success, None),
            ItemOutcome::Failure { error } => (ItemResultStatus::Failure, Some(error.clone())),
        };
        Self {
            id: result.id,
            status,
            error,
        }
    }
}

/// One batch as seen from a request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchResponse {
    pub batch_id: Uuid,
    /// The request's ids in this batch
    pub ids: Vec<ItemId>,
    pub status: BatchStatus,
    /// Only on the results endpoint, and only once the batch is completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<ItemResultResponse>>,
}

impl BatchResponse {
    fn from_summary(summary: &BatchSummary, with_results: bool) -> Self {
        Self {
            batch_id: summary.batch_id.0,
            ids: summary.ids.clone(),
            status: summary.status,
            results: if with_results {
                summary
                    .results
                    .as_ref()
                    .map(|results| results.iter().map(ItemResultResponse::from).collect())
            } else {
                None
            },
        }
    }
}

/// Response of `GET /status/{ingestion_id}` and `GET /status/{ingestion_id}/results`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusResponse {
    pub ingestion_id: Uuid,
    pub status: RequestStatus,
    /// In batch creation order
    pub batches: Vec<BatchResponse>,
}

impl StatusResponse {
    pub fn from_view(view: &RequestView, with_results: bool) -> Self {
        Self {
            ingestion_id: view.record.id.as_uuid(),
            status: view.status,
            batches: view
                .batches
                .iter()
                .map(|summary| BatchResponse::from_summary(summary, with_results))
                .collect(),
        }
    }
}

/// Response of `GET /status/{ingestion_id}/detailed`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetailedStatusResponse {
    pub ingestion_id: Uuid,
    pub status: RequestStatus,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub total_ids: usize,
    /// Ids that succeeded
    pub processed_ids: usize,
    pub failed_ids: usize,
    /// Share of ids with an outcome, 0 to 100
    pub progress: u8,
}

impl DetailedStatusResponse {
    pub fn from_view(view: &RequestView) -> Self {
        let progress = view.progress;
        Self {
            ingestion_id: view.record.id.as_uuid(),
            status: view.status,
            priority: view.record.priority,
            created_at: view.record.created_at,
            total_ids: progress.total,
            processed_ids: progress.processed,
            failed_ids: progress.failed,
            progress: progress.percent,
        }
    }
}
