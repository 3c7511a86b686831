//! Route definitions and server setup

use axum::http::StatusCode;
use axum::{
    Router, middleware,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::OpenApi;

use tollgate_core::Config;

use crate::presentation::{
    controllers::{
        AppState,
        health::health_check,
        rate_limit::{get_rate_limit_status, list_policies},
    },
    middleware::{RateLimiterState, identity_headers_middleware, rate_limit_middleware},
    models::*,
};

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::presentation::controllers::health::health_check,
        crate::presentation::controllers::rate_limit::get_rate_limit_status,
        crate::presentation::controllers::rate_limit::list_policies,
    ),
    components(
        schemas(
            ErrorResponse,
            RateLimitExceededResponse,
            RateLimitStatusResponse,
            PolicyResponse,
            PolicyListResponse,
            HealthResponse
        )
    ),
    tags(
        (name = "health", description = "Liveness and store backend reporting"),
        (name = "rate-limit", description = "Read-only views of rate limit policies and buckets")
    ),
    info(
        title = "Tollgate API",
        version = "0.1.0",
        description = "Distributed token-bucket admission control. Rate limited responses carry X-RateLimit-Limit, X-RateLimit-Remaining and X-RateLimit-Reset; denials return 429 with Retry-After."
    )
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Create the application router with the admission middleware stack.
///
/// `api` holds the protected routes; every route, including the fallback,
/// passes through rate limiting unless its path is exempt.
pub fn create_router(state: AppState, config: &Config, api: Router) -> Router {
    let rate_limiter_state = Arc::new(RateLimiterState::new(Arc::clone(&state.rate_limiter)));

    async fn root_handler() -> Response {
        Json(serde_json::json!({
            "name": "Tollgate",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Distributed token-bucket admission control",
            "endpoints": {
                "health": "/health",
                "rate_limit_status": "/api/v1/rate-limit/status",
                "rate_limit_policies": "/api/v1/rate-limit/policies",
                "openapi": "/api-docs/openapi.json"
            }
        }))
        .into_response()
    }

    let service_routes = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .route("/api/v1/rate-limit/status", get(get_rate_limit_status))
        .route("/api/v1/rate-limit/policies", get(list_policies))
        .with_state(state);

    let mut router = service_routes.merge(api).layer(middleware::from_fn_with_state(
        rate_limiter_state,
        rate_limit_middleware,
    ));

    // Layer order is reversed - identity extraction runs before rate limiting
    if config.rate_limit.trust_identity_headers {
        router = router.layer(middleware::from_fn(identity_headers_middleware));
    }

    let service_builder = ServiceBuilder::new()
        // HTTP tracing
        .layer(TraceLayer::new_for_http())
        // Request timeout
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.server.request_timeout_seconds),
        ));

    router.layer(service_builder)
}
