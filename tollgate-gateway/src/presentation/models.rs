//! API request and response models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use tollgate_core::infrastructure::rate_limiter::{BucketStatus, PolicyRule};

/// Error response model
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable error code
    #[schema(example = "INVALID_LIMIT_TYPE")]
    pub code: String,

    /// Human-readable error message
    #[schema(example = "Unknown limit type 'bulk_export'")]
    pub message: String,

    /// Additional error context and debugging information
    #[schema(example = r#"{"valid_limit_types": ["default", "billing"]}"#)]
    pub details: Option<serde_json::Value>,

    /// Unique request identifier for tracking and support
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub request_id: Uuid,

    /// Error occurrence timestamp
    #[schema(example = "2024-01-15T10:30:00Z")]
    pub timestamp: DateTime<Utc>,
}

/// Body of a 429 response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RateLimitExceededResponse {
    /// Always `RATE_LIMIT_EXCEEDED`
    #[schema(example = "RATE_LIMIT_EXCEEDED")]
    pub error: String,

    #[schema(example = "Rate limit exceeded. Please retry after 6 seconds.")]
    pub message: String,

    /// Seconds until one request will be admitted again
    #[schema(example = 6)]
    pub retry_after: u64,

    /// Requests per window for the applied policy
    #[schema(example = 20)]
    pub limit: u64,

    #[schema(example = 60)]
    pub window_seconds: u64,

    /// Name of the applied policy
    #[schema(example = "billing")]
    pub policy: String,

    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

/// Query for the status endpoint
#[derive(Debug, Deserialize, IntoParams)]
pub struct RateLimitStatusQuery {
    /// Policy name; `default` when omitted
    pub limit_type: Option<String>,
}

/// Current bucket status for the caller
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RateLimitStatusResponse {
    #[schema(example = "billing")]
    pub limit_type: String,

    /// Store key of the caller's bucket
    #[schema(example = "ratelimit:billing:org:acme")]
    pub key: String,

    #[schema(example = 20)]
    pub limit: u64,

    #[schema(example = 60)]
    pub window_seconds: u64,

    #[schema(example = 40)]
    pub burst_limit: u64,

    /// Requests that would be admitted right now
    #[schema(example = 37)]
    pub remaining: u64,

    /// Epoch seconds estimate for a full window from now
    #[schema(example = 1705314660)]
    pub reset_at: u64,

    /// True when the store could not be read
    pub degraded: bool,
}

impl From<BucketStatus> for RateLimitStatusResponse {
    fn from(status: BucketStatus) -> Self {
        Self {
            limit_type: status.policy,
            key: status.key,
            limit: status.limit,
            window_seconds: status.window_seconds,
            burst_limit: status.burst_limit,
            remaining: status.remaining,
            reset_at: status.reset_at,
            degraded: status.degraded,
        }
    }
}

/// One configured policy
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PolicyResponse {
    #[schema(example = "ai_generation")]
    pub name: String,

    /// Path prefix; `/` for the default policy
    #[schema(example = "/api/v1/ai/")]
    pub prefix: String,

    /// HTTP methods the rule applies to; empty for all
    pub methods: Vec<String>,

    #[schema(example = 50)]
    pub limit: u64,

    #[schema(example = 60)]
    pub window_seconds: u64,

    #[schema(example = 100)]
    pub burst_limit: u64,
}

impl From<&PolicyRule> for PolicyResponse {
    fn from(rule: &PolicyRule) -> Self {
        let policy = rule.policy();
        Self {
            name: rule.name().to_string(),
            prefix: rule.prefix().to_string(),
            methods: rule.methods().to_vec(),
            limit: policy.limit(),
            window_seconds: policy.window_seconds(),
            burst_limit: policy.burst_limit(),
        }
    }
}

/// Policy table listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PolicyListResponse {
    pub enabled: bool,
    /// Path prefixes that are never rate limited
    pub exempt_paths: Vec<String>,
    /// Default policy first, then rules in configured order
    pub policies: Vec<PolicyResponse>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// `healthy` while the process serves requests
    #[schema(example = "healthy")]
    pub status: String,

    #[schema(example = "0.1.0")]
    pub version: String,

    /// `dragonfly` or `memory`
    #[schema(example = "dragonfly")]
    pub store_backend: String,

    /// Requests admitted without consulting the store since startup
    #[schema(example = 0)]
    pub degraded_decisions: u64,

    pub timestamp: DateTime<Utc>,
}
