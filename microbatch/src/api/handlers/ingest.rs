//! Submission handler.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::Json,
};

use crate::api::{
    errors::Result,
    models::ingest::{IngestRequest, IngestResponse},
    AppState,
};

/// Accept a list of ids at a priority.
///
/// Returns `201 Created` for a new ingestion and `200 OK` with the existing ingestion
/// when an identical submission was accepted within the idempotency window.
#[tracing::instrument(skip_all)]
pub async fn ingest(
    State(state): State<AppState>,
    payload: std::result::Result<Json<IngestRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestResponse>)> {
    let Json(request) = payload?;

    let outcome = state.manager.submit(request.into()).await?;
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(outcome.into())))
}
