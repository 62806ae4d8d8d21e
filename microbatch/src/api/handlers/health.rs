use axum::{extract::State, response::Json};

use crate::api::{models::health::HealthResponse, AppState};

/// Liveness plus a load summary.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        timestamp: chrono::Utc::now(),
        active_requests: state.manager.active_requests(),
        queue_depth: state.manager.queue_depth(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::api::handlers::test_utils::create_test_app;
    use crate::api::models::health::HealthResponse;
    use crate::call::MockCall;

    #[tokio::test]
    async fn test_health_counts_active_requests() {
        let (server, manager) = create_test_app(MockCall::new());

        let health: HealthResponse = server.get("/health").await.json();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.service, "microbatch");
        assert!(health.timestamp <= chrono::Utc::now());
        assert_eq!(health.active_requests, 0);

        server
            .post("/ingest")
            .json(&json!({ "ids": [1, 2, 3, 4], "priority": "HIGH" }))
            .await;
        server
            .post("/ingest")
            .json(&json!({ "ids": [5], "priority": "LOW" }))
            .await;

        let health: HealthResponse = server.get("/health").await.json();
        assert_eq!(health.active_requests, 2);
        assert_eq!(health.queue_depth.high, 4);
        assert_eq!(health.queue_depth.total, 5);

        // [1, 2, 3] then [4, 5]
        manager.dispatcher().tick().await.unwrap();
        manager.dispatcher().tick().await.unwrap();

        let health: HealthResponse = server.get("/health").await.json();
        assert_eq!(health.active_requests, 0);
        assert_eq!(health.queue_depth.total, 0);
    }
}
