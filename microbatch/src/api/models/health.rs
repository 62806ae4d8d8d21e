use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::queue::QueueDepth;

/// Response of `GET /health`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthResponse {
    /// Always `healthy` while the server answers
    pub status: String,
    pub service: String,
    pub timestamp: DateTime<Utc>,
    /// Requests not yet completed
    pub active_requests: usize,
    /// Ids waiting in the intake queues
    pub queue_depth: QueueDepth,
}
