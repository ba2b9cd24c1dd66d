use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::metrics;

/// Root banner, kept for load balancers and curl checks.
pub async fn root_handler() -> impl IntoResponse {
    "Chat relay server is running"
}

/// Health check endpoint - returns server status
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let connections = state.registry.len().await as u64;
    let messages_stored = state.repository.message_count().await.unwrap_or(0) as u64;
    let snapshot = state.metrics.snapshot();

    let status = if snapshot.store_errors == 0 {
        "healthy"
    } else {
        "degraded"
    };

    Json(metrics::HealthStatus {
        status: status.to_string(),
        connections,
        messages_stored,
        uptime_secs: snapshot.uptime_secs,
    })
}

/// Metrics endpoint - returns detailed server metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// Liveness probe - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}

/// Readiness probe - returns 200 if the server is ready to accept connections
pub async fn health_ready_handler(State(state): State<AppState>) -> Response {
    let db_ok = state.db.pool.acquire().await.is_ok();

    if db_ok {
        Json(serde_json::json!({
            "status": "ready",
            "database": "connected"
        }))
        .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected"
            })),
        )
            .into_response()
    }
}
