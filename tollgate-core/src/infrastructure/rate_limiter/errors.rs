//! Rate limiter error types

use std::time::Duration;
use thiserror::Error;

/// Invalid policy values, rejected when the policy table is built
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("limit must be positive, got {0}")]
    NonPositiveLimit(i64),

    #[error("window_seconds must be positive, got {0}")]
    NonPositiveWindow(i64),

    #[error("burst_limit ({burst_limit}) must be at least limit ({limit})")]
    BurstBelowLimit { limit: i64, burst_limit: i64 },

    #[error("burst_limit * window_seconds must not exceed {max}, got {product}")]
    OutOfRange { product: u128, max: u64 },

    #[error("policy rule name must not be empty")]
    EmptyName,

    #[error("policy rule '{0}' has an empty path prefix")]
    EmptyPrefix(String),

    #[error("policy rule name '{0}' is used more than once")]
    DuplicateName(String),
}

/// Failure talking to the shared bucket store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bucket store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("bucket store transport error: {0}")]
    Transport(#[from] redis::RedisError),

    #[error("malformed bucket store reply: {0}")]
    MalformedReply(String),

    #[error("bucket store client is closed")]
    Closed,
}

/// Errors surfaced by the rate limiter service
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Introspection asked for a policy name that is not configured
    #[error("unknown limit type '{0}'")]
    UnknownLimitType(String),

    #[error("invalid rate limit policy: {0}")]
    InvalidPolicy(#[from] PolicyError),

    #[error("bucket store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl RateLimitError {
    /// Whether the caller sent a bad request rather than the service failing
    pub fn is_client_error(&self) -> bool {
        matches!(self, RateLimitError::UnknownLimitType(_))
    }
}
