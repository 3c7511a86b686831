//! HTTP middleware for the web server

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

use tollgate_core::infrastructure::rate_limiter::{
    Decision, RateLimitError, RateLimiterService, RequestIdentity,
};

use crate::presentation::models::{ErrorResponse, RateLimitExceededResponse};

/// Organization identifier set by a trusted edge proxy
pub const ORGANIZATION_ID_HEADER: &str = "x-organization-id";
/// User identifier set by a trusted edge proxy
pub const USER_ID_HEADER: &str = "x-user-id";

pub const RATE_LIMIT_LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const RATE_LIMIT_REMAINING_HEADER: HeaderName =
    HeaderName::from_static("x-ratelimit-remaining");
pub const RATE_LIMIT_RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Convert RateLimitError to HTTP response
pub fn rate_limit_error_to_response(error: RateLimitError) -> Response {
    let (status, code, message, details) = match &error {
        RateLimitError::UnknownLimitType(name) => (
            StatusCode::BAD_REQUEST,
            "INVALID_LIMIT_TYPE",
            format!("Unknown limit type '{}'", name),
            None,
        ),
        RateLimitError::InvalidPolicy(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "INVALID_POLICY",
            "Rate limit policy configuration is invalid".to_string(),
            Some(serde_json::json!({ "reason": e.to_string() })),
        ),
        RateLimitError::StoreUnavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "STORE_UNAVAILABLE",
            "Rate limit store is unavailable".to_string(),
            None,
        ),
    };

    if error.is_client_error() {
        tracing::debug!(error = %error, "Rejected rate limit request");
    } else {
        tracing::error!(error = %error, "Rate limit request failed");
    }

    (
        status,
        Json(ErrorResponse {
            code: code.to_string(),
            message,
            details,
            request_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        }),
    )
        .into_response()
}

// ============================================================================
// Rate Limiter State (wrapper around tollgate-core RateLimiterService)
// ============================================================================

/// Shared state for rate limiting middleware
#[derive(Clone)]
pub struct RateLimiterState {
    /// The rate limiter service from tollgate-core
    pub service: Arc<RateLimiterService>,
}

impl RateLimiterState {
    /// Create a new rate limiter state
    pub fn new(service: Arc<RateLimiterService>) -> Self {
        Self { service }
    }
}

impl std::fmt::Debug for RateLimiterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiterState")
            .field("enabled", &self.service.is_enabled())
            .field("backend", &self.service.backend_name())
            .finish()
    }
}

/// Fill [`RequestIdentity`] from `X-Organization-Id` / `X-User-Id`.
///
/// Only mount this behind an edge that strips these headers from client
/// traffic. An identity already published by upstream auth is left untouched.
pub async fn identity_headers_middleware(mut request: Request, next: Next) -> Response {
    if request.extensions().get::<RequestIdentity>().is_none() {
        let identity = identity_from_headers(request.headers());
        request.extensions_mut().insert(identity);
    }

    next.run(request).await
}

fn identity_from_headers(headers: &HeaderMap) -> RequestIdentity {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    RequestIdentity {
        organization_id: header(ORGANIZATION_ID_HEADER),
        user_id: header(USER_ID_HEADER),
    }
}

/// Extract IP address from request
///
/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer.
pub fn extract_ip(request: &Request) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    extract_ip_from_parts(request.headers(), peer)
}

pub fn extract_ip_from_parts(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown-ip".to_string())
}

/// Identity published by upstream auth, or anonymous
pub fn request_identity(request: &Request) -> RequestIdentity {
    request
        .extensions()
        .get::<RequestIdentity>()
        .cloned()
        .unwrap_or_default()
}

/// Attach `X-RateLimit-Limit`, `X-RateLimit-Remaining` and `X-RateLimit-Reset`
fn add_rate_limit_headers(response: &mut Response, decision: &Decision) {
    let headers = response.headers_mut();

    headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(
        RATE_LIMIT_REMAINING_HEADER,
        HeaderValue::from(decision.remaining),
    );
    headers.insert(RATE_LIMIT_RESET_HEADER, HeaderValue::from(decision.reset_at));
}

fn rate_limit_exceeded_response(decision: &Decision) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(RateLimitExceededResponse {
            error: "RATE_LIMIT_EXCEEDED".to_string(),
            message: format!(
                "Rate limit exceeded. Please retry after {} seconds.",
                decision.retry_after
            ),
            retry_after: decision.retry_after,
            limit: decision.limit,
            window_seconds: decision.window_seconds,
            policy: decision.policy.clone(),
            request_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        }),
    )
        .into_response();

    add_rate_limit_headers(&mut response, decision);
    response.headers_mut().insert(
        axum::http::header::RETRY_AFTER,
        HeaderValue::from(decision.retry_after),
    );

    response
}

/// Rate limiting middleware
///
/// Resolves the policy from path and method, derives the key from the
/// request identity (organization > user > IP), and spends one credit.
/// Denied requests never reach the handler. Admitted and denied responses
/// both carry the rate limit headers.
pub async fn rate_limit_middleware(
    State(state): State<Arc<RateLimiterState>>,
    request: Request,
    next: Next,
) -> Response {
    // Skip rate limiting if disabled
    if !state.service.is_enabled() {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();

    // Skip rate limiting for exempt paths (docs, health checks, introspection)
    if state.service.is_exempt(&path) {
        return next.run(request).await;
    }

    let ip = extract_ip(&request);
    let identity = request_identity(&request);

    let decision = state
        .service
        .check_request(&identity, &ip, request.method().as_str(), &path)
        .await;

    if decision.allowed {
        let mut response = next.run(request).await;
        add_rate_limit_headers(&mut response, &decision);
        response
    } else {
        tracing::debug!(
            ip = %ip,
            path = %path,
            policy = %decision.policy,
            retry_after = decision.retry_after,
            "Rate limit exceeded"
        );
        rate_limit_exceeded_response(&decision)
    }
}
