//! Status handlers.
//!
//! An ingestion id that is not a UUID cannot name a request, so it is reported as
//! not found rather than as a malformed path.

use axum::{
    extract::{Path, State},
    response::Json,
};

use crate::api::{
    errors::{Error, Result},
    models::status::{DetailedStatusResponse, StatusResponse},
    AppState,
};
use crate::types::RequestId;

fn parse_ingestion_id(raw: &str) -> Result<RequestId> {
    raw.parse().map_err(|_| Error::request_not_found(raw))
}

/// Derived status of an ingestion and its batches, in creation order.
#[tracing::instrument(skip(state))]
pub async fn get_status(
    State(state): State<AppState>,
    Path(ingestion_id): Path<String>,
) -> Result<Json<StatusResponse>> {
    let request_id = parse_ingestion_id(&ingestion_id)?;
    let view = state.manager.get_status(request_id).await?;
    Ok(Json(StatusResponse::from_view(&view, false)))
}

/// As [`get_status`], with per-id outcomes for completed batches.
#[tracing::instrument(skip(state))]
pub async fn get_results(
    State(state): State<AppState>,
    Path(ingestion_id): Path<String>,
) -> Result<Json<StatusResponse>> {
    let request_id = parse_ingestion_id(&ingestion_id)?;
    let view = state.manager.get_status(request_id).await?;
    Ok(Json(StatusResponse::from_view(&view, true)))
}

/// Priority, timestamps and progress counters of an ingestion.
#[tracing::instrument(skip(state))]
pub async fn get_detailed_status(
    State(state): State<AppState>,
    Path(ingestion_id): Path<String>,
) -> Result<Json<DetailedStatusResponse>> {
    let request_id = parse_ingestion_id(&ingestion_id)?;
    let view = state.manager.get_status(request_id).await?;
    Ok(Json(DetailedStatusResponse::from_view(&view)))
}
