//! Rate Limiting Infrastructure
//!
//! This module provides a distributed token bucket rate limiter with:
//! - Per-route policies resolved by longest path prefix
//! - Organization > user > IP key derivation
//! - Atomic load-refill-consume in the shared store (Dragonfly/Redis Lua script)
//! - Fail-open decisions when the store is slow or unreachable

pub mod errors;
pub mod policy;
pub mod service;
pub mod storage;
pub mod token_bucket;
pub mod types;

pub use errors::{PolicyError, RateLimitError, StoreError};
pub use policy::{DEFAULT_POLICY_NAME, PolicyRule, PolicyTable, RateLimitPolicy};
pub use service::RateLimiterService;
pub use storage::{BucketStore, ConsumeOutcome, DragonflyBucketStore, InMemoryBucketStore};
pub use token_bucket::TokenBucket;
pub use types::{
    BucketState, BucketStatus, Decision, MICROS_PER_SEC, MICROS_PER_TOKEN, RateLimitKey,
    RequestIdentity, current_time_micros,
};
