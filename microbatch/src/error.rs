use thiserror::Error;

use crate::types::ItemId;

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Errors that can occur in the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Malformed submission, rejected before any queue mutation
    #[error("Invalid submission: {message}")]
    Validation { message: String },

    /// Unknown request or batch on query
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: &'static str, id: String },

    /// A single external call attempt failed. Recorded in batch results, never
    /// surfaced as a request-level error.
    #[error("External call for id {id} failed: {message}")]
    ExternalCall { id: ItemId, message: String },

    /// The dispatcher observed a state that can only come from a bug
    #[error("Scheduling invariant violated: {0}")]
    InvariantViolation(String),

    /// `run` was called while the dispatcher task is alive
    #[error("Dispatcher is already running")]
    AlreadyRunning,

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SchedulerError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        SchedulerError::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn request_not_found(id: impl ToString) -> Self {
        SchedulerError::NotFound {
            resource: "Ingestion request",
            id: id.to_string(),
        }
    }

    pub(crate) fn batch_not_found(id: impl ToString) -> Self {
        SchedulerError::NotFound {
            resource: "Batch",
            id: id.to_string(),
        }
    }
}
