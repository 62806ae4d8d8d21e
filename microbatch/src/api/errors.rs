use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

use crate::error::SchedulerError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Request body or parameters failed validation
    #[error("{message}")]
    Unprocessable { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unprocessable { message } => message.clone(),
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
            Error::Internal { .. } => "Internal server error".to_string(),
        }
    }

    pub fn request_not_found(id: impl ToString) -> Self {
        Error::NotFound {
            resource: "Ingestion request".to_string(),
            id: id.to_string(),
        }
    }
}

impl From<SchedulerError> for Error {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::Validation { message } => Error::Unprocessable { message },
            SchedulerError::NotFound { resource, id } => Error::NotFound {
                resource: resource.to_string(),
                id,
            },
            other => Error::Internal {
                operation: format!("process ingestion: {other}"),
            },
        }
    }
}

/// Malformed JSON, wrong field types and unknown priorities are all validation failures.
impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::Unprocessable {
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Internal { .. } => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Unprocessable { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        (status, Json(json!({ "message": self.user_message() }))).into_response()
    }
}

/// Type alias for handler results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RequestId;

    #[test]
    fn test_scheduler_errors_map_to_status_codes() {
        let validation: Error = SchedulerError::Validation {
            message: "ids must not be empty".to_string(),
        }
        .into();
        assert_eq!(validation.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(validation.user_message(), "ids must not be empty");

        let not_found: Error = SchedulerError::NotFound {
            resource: "Ingestion request",
            id: "abc".to_string(),
        }
        .into();
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let internal: Error = SchedulerError::InvariantViolation("batch drained twice".to_string()).into();
        assert_eq!(internal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        // Internals never reach the client
        assert_eq!(internal.user_message(), "Internal server error");

        let already_running: Error = SchedulerError::AlreadyRunning.into();
        assert!(matches!(already_running, Error::Internal { .. }));
    }

    #[test]
    fn test_not_found_message_names_request() {
        let id = RequestId::new();
        let err = Error::request_not_found(id.as_uuid());
        assert_eq!(
            err.user_message(),
            format!("Ingestion request with ID {} not found", id.as_uuid())
        );
    }
}
