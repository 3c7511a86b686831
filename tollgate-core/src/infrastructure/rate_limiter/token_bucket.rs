//! Token Bucket Rate Limiter
//!
//! Each key holds a balance of credits that refills at `limit / window_seconds`
//! up to `burst_limit`, and every admitted request spends one credit. The
//! arithmetic runs inside the bucket store as a single atomic operation; this
//! type bounds that call with a timeout and turns store failures into an
//! explicit fail-open decision.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::errors::StoreError;
use super::policy::PolicyRule;
use super::storage::BucketStore;
use super::types::{BucketState, BucketStatus, Decision, RateLimitKey, reset_at};

/// Token bucket rate limiter
pub struct TokenBucket {
    storage: Arc<dyn BucketStore>,
    key_prefix: String,
    operation_timeout: Duration,
    degraded_decisions: AtomicU64,
}

impl TokenBucket {
    /// Create a new token bucket rate limiter
    pub fn new(storage: Arc<dyn BucketStore>, key_prefix: &str, operation_timeout: Duration) -> Self {
        Self {
            storage,
            key_prefix: key_prefix.to_string(),
            operation_timeout,
            degraded_decisions: AtomicU64::new(0),
        }
    }

    /// Check whether a request is admitted and consume one credit if so.
    ///
    /// `now` is epoch microseconds. Never fails: a store error or timeout
    /// yields an admitted decision flagged `degraded`.
    pub async fn check_and_consume(
        &self,
        key: &RateLimitKey,
        rule: &PolicyRule,
        now: u64,
    ) -> Decision {
        let store_key = key.to_redis_key(&self.key_prefix, rule.name());

        let outcome = self
            .bounded(self.storage.consume(&store_key, rule.policy(), now))
            .await;

        match outcome {
            Ok(outcome) if outcome.allowed => {
                let decision = Decision::admitted(rule, &outcome.state, now);
                debug!(
                    key = %store_key,
                    policy = %rule.name(),
                    remaining = decision.remaining,
                    limit = decision.limit,
                    "Rate limit check passed"
                );
                decision
            }
            Ok(outcome) => {
                let decision = Decision::denied(rule, &outcome.state, now);
                warn!(
                    key = %store_key,
                    policy = %rule.name(),
                    retry_after = decision.retry_after,
                    "Rate limit exceeded"
                );
                decision
            }
            Err(e) => {
                self.degraded_decisions.fetch_add(1, Ordering::Relaxed);
                warn!(
                    key = %store_key,
                    policy = %rule.name(),
                    backend = self.storage.backend_name(),
                    degraded = true,
                    error = %e,
                    "Bucket store unavailable, admitting request"
                );
                Decision::fail_open(rule, now)
            }
        }
    }

    /// Project what the next check would see without consuming or writing.
    ///
    /// An unreachable store reports the policy limit with `degraded` set,
    /// matching what a check would do.
    pub async fn peek(&self, key: &RateLimitKey, rule: &PolicyRule, now: u64) -> BucketStatus {
        let store_key = key.to_redis_key(&self.key_prefix, rule.name());
        let policy = rule.policy();

        let (remaining, degraded) = match self.bounded(self.storage.load(&store_key, now)).await {
            Ok(stored) => {
                let state = stored
                    .unwrap_or_else(|| BucketState::full(policy, now))
                    .refilled(policy, now);
                (state.remaining(), false)
            }
            Err(e) => {
                warn!(
                    key = %store_key,
                    degraded = true,
                    error = %e,
                    "Bucket store unavailable while peeking"
                );
                (policy.limit(), true)
            }
        };

        BucketStatus {
            policy: rule.name().to_string(),
            key: store_key,
            limit: policy.limit(),
            window_seconds: policy.window_seconds(),
            burst_limit: policy.burst_limit(),
            remaining,
            reset_at: reset_at(policy, now),
            degraded,
        }
    }

    /// Number of decisions admitted because the store could not be reached
    pub fn degraded_decisions(&self) -> u64 {
        self.degraded_decisions.load(Ordering::Relaxed)
    }

    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.operation_timeout, operation)
            .await
            .map_err(|_| StoreError::Timeout(self.operation_timeout))?
    }
}
