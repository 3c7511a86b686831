//! Rate limit introspection controllers
//!
//! These routes sit on the exempt list, so reading a status never spends a
//! credit from the bucket being reported.

use axum::{
    extract::{Query, Request, State},
    response::{Json, Response},
};
use tracing::instrument;

use crate::presentation::controllers::AppState;
use crate::presentation::middleware::{extract_ip, rate_limit_error_to_response, request_identity};
use crate::presentation::models::{
    ErrorResponse, PolicyListResponse, PolicyResponse, RateLimitStatusQuery,
    RateLimitStatusResponse,
};

/// GET /api/v1/rate-limit/status - Current bucket for the caller
#[utoipa::path(
    get,
    path = "/api/v1/rate-limit/status",
    params(RateLimitStatusQuery),
    responses(
        (status = 200, description = "Bucket status retrieved", body = RateLimitStatusResponse),
        (status = 400, description = "Unknown limit type", body = ErrorResponse)
    ),
    tag = "rate-limit"
)]
#[instrument(skip(state, request))]
pub async fn get_rate_limit_status(
    State(state): State<AppState>,
    Query(query): Query<RateLimitStatusQuery>,
    request: Request,
) -> Result<Json<RateLimitStatusResponse>, Response> {
    let identity = request_identity(&request);
    let ip = extract_ip(&request);

    let status = state
        .rate_limiter
        .status(&identity, &ip, query.limit_type.as_deref())
        .await
        .map_err(rate_limit_error_to_response)?;

    Ok(Json(status.into()))
}

/// GET /api/v1/rate-limit/policies - Configured policy table
#[utoipa::path(
    get,
    path = "/api/v1/rate-limit/policies",
    responses(
        (status = 200, description = "Policy table", body = PolicyListResponse)
    ),
    tag = "rate-limit"
)]
pub async fn list_policies(State(state): State<AppState>) -> Json<PolicyListResponse> {
    let service = &state.rate_limiter;

    Json(PolicyListResponse {
        enabled: service.is_enabled(),
        exempt_paths: service.config().exempt_paths.clone(),
        policies: service.policies().iter().map(PolicyResponse::from).collect(),
    })
}
