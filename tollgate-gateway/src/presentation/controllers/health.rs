//! Health controller

use axum::{extract::State, response::Json};
use chrono::Utc;

use crate::presentation::controllers::AppState;
use crate::presentation::models::HealthResponse;

/// GET /health - Liveness and store backend report
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store_backend: state.rate_limiter.backend_name().to_string(),
        degraded_decisions: state.rate_limiter.degraded_decisions(),
        timestamp: Utc::now(),
    })
}
