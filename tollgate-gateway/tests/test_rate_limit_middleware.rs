//! Tests for the admission middleware
//!
//! These tests drive a small router through `rate_limit_middleware` and check
//! header injection, 429 short-circuiting and identity-based keying.

use axum::{
    Router,
    body::Body,
    extract::Request,
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tower::ServiceExt;

use tollgate_core::config::{PolicyConfig, PolicyRuleConfig, RateLimitConfig};
use tollgate_core::infrastructure::rate_limiter::{
    InMemoryBucketStore, RateLimiterService, RequestIdentity,
};
use tollgate_gateway::presentation::{
    RateLimitExceededResponse, RateLimiterState, identity_headers_middleware,
    rate_limit_middleware,
};

/// Default of 3 per minute with a burst of 3, exports limited to 1
fn test_config() -> RateLimitConfig {
    RateLimitConfig {
        default_policy: PolicyConfig::new(3, 60, 3),
        rules: vec![PolicyRuleConfig {
            name: "exports".to_string(),
            prefix: "/api/v1/exports/".to_string(),
            methods: vec![],
            limit: 1,
            window_seconds: 60,
            burst_limit: 1,
        }],
        ..RateLimitConfig::default()
    }
}

fn rate_limiter_state(config: RateLimitConfig) -> Arc<RateLimiterState> {
    let service = RateLimiterService::with_storage(
        Arc::new(InMemoryBucketStore::new()),
        config,
        Duration::from_secs(2),
    )
    .unwrap();
    Arc::new(RateLimiterState::new(Arc::new(service)))
}

/// Stand-in for upstream auth: `x-test-user` becomes the request identity
async fn fake_auth_middleware(mut request: Request, next: Next) -> Response {
    if let Some(user) = request
        .headers()
        .get("x-test-user")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    {
        request.extensions_mut().insert(RequestIdentity::user(user));
    }
    next.run(request).await
}

fn create_test_router(state: Arc<RateLimiterState>, hits: Arc<AtomicUsize>) -> Router {
    let handler = move || {
        let hits = Arc::clone(&hits);
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            "ok"
        }
    };

    Router::new()
        .route("/api/v1/items", get(handler.clone()))
        .route("/api/v1/exports/run", get(handler.clone()))
        .route("/health", get(handler))
        // Add rate limiter FIRST so it runs LAST (after auth publishes the identity)
        .layer(middleware::from_fn_with_state(state, rate_limit_middleware))
        .layer(middleware::from_fn(fake_auth_middleware))
}

fn get_request(uri: &str) -> Request {
    Request::builder()
        .uri(uri)
        .header("x-forwarded-for", "203.0.113.9")
        .body(Body::empty())
        .unwrap()
}

fn header_u64(response: &Response, name: &str) -> u64 {
    response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("missing header {}", name))
        .to_str()
        .unwrap()
        .parse()
        .unwrap()
}

#[tokio::test]
async fn test_admitted_request_carries_headers() {
    let hits = Arc::new(AtomicUsize::new(0));
    let router = create_test_router(rate_limiter_state(test_config()), hits.clone());

    let response = router.oneshot(get_request("/api/v1/items")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_u64(&response, "x-ratelimit-limit"), 3);
    assert_eq!(header_u64(&response, "x-ratelimit-remaining"), 2);
    assert!(header_u64(&response, "x-ratelimit-reset") > 1_600_000_000);
    assert!(response.headers().get("retry-after").is_none());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_denied_request_short_circuits() {
    let hits = Arc::new(AtomicUsize::new(0));
    let router = create_test_router(rate_limiter_state(test_config()), hits.clone());

    for _ in 0..3 {
        let response = router
            .clone()
            .oneshot(get_request("/api/v1/items"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = router
        .clone()
        .oneshot(get_request("/api/v1/items"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert_eq!(header_u64(&response, "x-ratelimit-limit"), 3);
    assert_eq!(header_u64(&response, "x-ratelimit-remaining"), 0);
    let retry_after = header_u64(&response, "retry-after");
    assert!(retry_after > 0 && retry_after <= 20);

    let body = axum::body::to_bytes(response.into_body(), 4096)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "RATE_LIMIT_EXCEEDED");
    assert_eq!(json["retry_after"], retry_after);
    assert_eq!(json["limit"], 3);
    assert_eq!(json["window_seconds"], 60);
    assert!(json["message"].as_str().unwrap().contains("retry after"));

    let parsed: RateLimitExceededResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed.policy, "default");
}

#[tokio::test]
async fn test_policies_have_independent_buckets() {
    let hits = Arc::new(AtomicUsize::new(0));
    let router = create_test_router(rate_limiter_state(test_config()), hits);

    let first = router
        .clone()
        .oneshot(get_request("/api/v1/exports/run"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(header_u64(&first, "x-ratelimit-limit"), 1);

    let second = router
        .clone()
        .oneshot(get_request("/api/v1/exports/run"))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header_u64(&second, "retry-after"), 60);

    // The exhausted exports bucket leaves general traffic alone
    let other = router
        .clone()
        .oneshot(get_request("/api/v1/items"))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::OK);
    assert_eq!(header_u64(&other, "x-ratelimit-remaining"), 2);
}

#[tokio::test]
async fn test_exempt_paths_skip_limiting() {
    let hits = Arc::new(AtomicUsize::new(0));
    let router = create_test_router(rate_limiter_state(test_config()), hits.clone());

    for _ in 0..10 {
        let response = router.clone().oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }
    assert_eq!(hits.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn test_disabled_rate_limiting_is_pass_through() {
    let hits = Arc::new(AtomicUsize::new(0));
    let config = RateLimitConfig {
        enabled: false,
        ..test_config()
    };
    let router = create_test_router(rate_limiter_state(config), hits.clone());

    for _ in 0..10 {
        let response = router
            .clone()
            .oneshot(get_request("/api/v1/items"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-ratelimit-remaining").is_none());
    }
    assert_eq!(hits.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn test_authenticated_users_get_own_buckets() {
    let hits = Arc::new(AtomicUsize::new(0));
    let router = create_test_router(rate_limiter_state(test_config()), hits);

    let as_user = |user: &str| {
        Request::builder()
            .uri("/api/v1/exports/run")
            .header("x-forwarded-for", "203.0.113.9")
            .header("x-test-user", user)
            .body(Body::empty())
            .unwrap()
    };

    // Same source address, different users
    let alice = router.clone().oneshot(as_user("alice")).await.unwrap();
    let bob = router.clone().oneshot(as_user("bob")).await.unwrap();
    let alice_again = router.clone().oneshot(as_user("alice")).await.unwrap();

    assert_eq!(alice.status(), StatusCode::OK);
    assert_eq!(bob.status(), StatusCode::OK);
    assert_eq!(alice_again.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_identity_headers_share_organization_bucket() {
    let state = rate_limiter_state(test_config());
    let router = Router::new()
        .route("/api/v1/exports/run", get(|| async { "ok" }))
        .layer(middleware::from_fn_with_state(state, rate_limit_middleware))
        .layer(middleware::from_fn(identity_headers_middleware));

    let member = |org: &str, user: &str, ip: &str| {
        Request::builder()
            .uri("/api/v1/exports/run")
            .header("x-forwarded-for", ip)
            .header("x-organization-id", org)
            .header("x-user-id", user)
            .body(Body::empty())
            .unwrap()
    };

    let first = router
        .clone()
        .oneshot(member("acme", "alice", "10.0.0.1"))
        .await
        .unwrap();
    let second = router
        .clone()
        .oneshot(member("acme", "bob", "10.0.0.2"))
        .await
        .unwrap();
    let other_org = router
        .clone()
        .oneshot(member("globex", "carol", "10.0.0.1"))
        .await
        .unwrap();

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(other_org.status(), StatusCode::OK);
}
