//! HTTP API.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | POST | `/ingest` | [`handlers::ingest::ingest`] |
//! | GET | `/status/{ingestion_id}` | [`handlers::status::get_status`] |
//! | GET | `/status/{ingestion_id}/results` | [`handlers::status::get_results`] |
//! | GET | `/status/{ingestion_id}/detailed` | [`handlers::status::get_detailed_status`] |
//! | GET | `/health` | [`handlers::health::health`] |

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::manager::IngestManager;

pub mod errors;
pub mod handlers;
pub mod models;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<dyn IngestManager>,
}

impl AppState {
    pub fn new(manager: Arc<dyn IngestManager>) -> Self {
        Self { manager }
    }
}

/// Build the application router with request tracing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ingest", post(handlers::ingest::ingest))
        .route("/status/{ingestion_id}", get(handlers::status::get_status))
        .route("/status/{ingestion_id}/results", get(handlers::status::get_results))
        .route("/status/{ingestion_id}/detailed", get(handlers::status::get_detailed_status))
        .route("/health", get(handlers::health::health))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
