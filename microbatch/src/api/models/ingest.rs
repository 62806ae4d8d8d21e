//! Models for the ingestion endpoint.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::manager::{Submission, SubmitOutcome};
use crate::types::{ItemId, Priority, RequestStatus};

/// Body of `POST /ingest`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestRequest {
    /// Non-empty list of positive ids
    pub ids: Vec<ItemId>,
    pub priority: Priority,
    /// Optional caller-chosen key; identical keys inside the idempotency window resolve
    /// to the same ingestion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl From<IngestRequest> for Submission {
    fn from(request: IngestRequest) -> Self {
        Submission {
            ids: request.ids,
            priority: request.priority,
            idempotency_key: request.idempotency_key,
        }
    }
}

/// Acknowledgement of a submission.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestResponse {
    pub ingestion_id: Uuid,
    pub status: RequestStatus,
    pub message: String,
}

impl From<SubmitOutcome> for IngestResponse {
    fn from(outcome: SubmitOutcome) -> Self {
        let message = if outcome.created {
            "Ingestion request accepted"
        } else {
            "Duplicate submission, returning existing ingestion"
        };
        Self {
            ingestion_id: outcome.request_id.as_uuid(),
            status: outcome.status,
            message: message.to_string(),
        }
    }
}
