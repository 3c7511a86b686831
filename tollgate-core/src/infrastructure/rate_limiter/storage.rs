//! Rate Limit Storage Backends
//!
//! Provides storage implementations for token bucket state:
//! - Dragonfly/Redis for distributed, production use. The whole
//!   load-refill-consume-store sequence runs as one server-side script, so
//!   concurrent workers in different processes are serialised per key.
//! - In-memory for development and single-instance deployments, where one
//!   async mutex plays the role of the single writer.

use async_trait::async_trait;
use redis::IntoConnectionInfo;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::errors::StoreError;
use super::policy::RateLimitPolicy;
use super::types::{BucketState, current_time_micros};
use crate::config::StoreConfig;

/// Result of the atomic consume operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumeOutcome {
    /// Whether a credit was spent
    pub allowed: bool,
    /// Bucket state as persisted by the operation
    pub state: BucketState,
}

/// Shared, cross-process storage for bucket state
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Atomically load (or create), refill, try to consume one credit and
    /// persist the bucket with a TTL of two windows.
    ///
    /// No other consume for the same key may interleave with this call.
    async fn consume(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        now: u64,
    ) -> Result<ConsumeOutcome, StoreError>;

    /// Read stored state without modifying it
    async fn load(&self, key: &str, now: u64) -> Result<Option<BucketState>, StoreError>;

    /// Short backend name for logs and health output
    fn backend_name(&self) -> &'static str;

    /// Drop expired entries (no-op for stores with native TTL)
    async fn cleanup(&self) {}

    /// Release connections; later operations fail with [`StoreError::Closed`]
    async fn close(&self) {}
}

/// Load-refill-consume-store, executed atomically by the store.
///
/// ARGV: limit, window_seconds, burst (micro-tokens), full refill time (us),
/// now (us), ttl (ms). Returns `{allowed, tokens, last_refill}`.
///
/// The refill quotient is corrected after the float division so it equals
/// the integer floor computed by `BucketState::refilled`.
const CONSUME_SCRIPT: &str = r#"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local burst = tonumber(ARGV[3])
local full_refill = tonumber(ARGV[4])
local now = tonumber(ARGV[5])
local ttl_ms = tonumber(ARGV[6])
local token = 1000000

local state = redis.call('HMGET', key, 'tokens', 'last_refill')
local tokens = tonumber(state[1])
local last_refill = tonumber(state[2])
if tokens == nil or last_refill == nil then
    tokens = burst
    last_refill = now
end

local elapsed = now - last_refill
if elapsed < 0 then elapsed = 0 end
if elapsed > full_refill then elapsed = full_refill end

local product = elapsed * limit
local refill = math.floor(product / window)
if refill * window > product then refill = refill - 1 end
if (refill + 1) * window <= product then refill = refill + 1 end

tokens = math.min(tokens + refill, burst)
if now > last_refill then last_refill = now end

local allowed = 0
if tokens >= token then
    tokens = tokens - token
    allowed = 1
end

redis.call('HSET', key,
    'tokens', string.format('%.0f', tokens),
    'last_refill', string.format('%.0f', last_refill))
redis.call('PEXPIRE', key, ttl_ms)

return {allowed, tokens, last_refill}
"#;

/// Dragonfly/Redis storage backend
pub struct DragonflyBucketStore {
    connection_manager: ConnectionManager,
    consume_script: redis::Script,
    closed: AtomicBool,
}

impl DragonflyBucketStore {
    /// Connect, apply credentials/database overrides and verify with PING.
    ///
    /// The connection manager reconnects on its own after transport errors or
    /// response timeouts.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let mut info = config.url.as_str().into_connection_info()?;
        if let Some(db) = config.database {
            info.redis.db = db;
        }
        if let Some(username) = &config.username {
            info.redis.username = Some(username.clone());
        }
        if let Some(password) = &config.password {
            info.redis.password = Some(password.clone());
        }

        let client = redis::Client::open(info)?;

        let connection_timeout = Duration::from_millis(config.connection_timeout_ms);
        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(connection_timeout)
            .set_response_timeout(Duration::from_millis(config.response_timeout_ms));

        let connection_manager = tokio::time::timeout(
            connection_timeout,
            ConnectionManager::new_with_config(client, manager_config),
        )
        .await
        .map_err(|_| StoreError::Timeout(connection_timeout))?
        .map_err(|e| {
            warn!("Failed to create connection manager for rate limiting: {}", e);
            StoreError::Transport(e)
        })?;

        // Test connection
        let mut conn = connection_manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await.map_err(|e| {
            warn!("Failed to ping bucket store: {}", e);
            StoreError::Transport(e)
        })?;

        debug!("Successfully connected to Dragonfly for rate limiting");

        Ok(Self {
            connection_manager,
            consume_script: redis::Script::new(CONSUME_SCRIPT),
            closed: AtomicBool::new(false),
        })
    }

    fn connection(&self) -> Result<ConnectionManager, StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(self.connection_manager.clone())
    }
}

fn reply_u64(value: i64, field: &str) -> Result<u64, StoreError> {
    u64::try_from(value)
        .map_err(|_| StoreError::MalformedReply(format!("negative {}: {}", field, value)))
}

#[async_trait]
impl BucketStore for DragonflyBucketStore {
    async fn consume(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        now: u64,
    ) -> Result<ConsumeOutcome, StoreError> {
        let mut conn = self.connection()?;

        let reply: Vec<i64> = self
            .consume_script
            .key(key)
            .arg(policy.limit())
            .arg(policy.window_seconds())
            .arg(policy.burst_micros())
            .arg(policy.full_refill_micros())
            .arg(now)
            .arg(policy.ttl_millis())
            .invoke_async(&mut conn)
            .await?;

        match reply.as_slice() {
            [allowed, tokens, last_refill] => Ok(ConsumeOutcome {
                allowed: *allowed == 1,
                state: BucketState {
                    tokens: reply_u64(*tokens, "tokens")?,
                    last_refill: reply_u64(*last_refill, "last_refill")?,
                },
            }),
            other => Err(StoreError::MalformedReply(format!(
                "expected 3 values from consume script, got {}",
                other.len()
            ))),
        }
    }

    async fn load(&self, key: &str, _now: u64) -> Result<Option<BucketState>, StoreError> {
        let mut conn = self.connection()?;

        let (tokens, last_refill): (Option<u64>, Option<u64>) = redis::cmd("HMGET")
            .arg(key)
            .arg("tokens")
            .arg("last_refill")
            .query_async(&mut conn)
            .await?;

        Ok(match (tokens, last_refill) {
            (Some(tokens), Some(last_refill)) => Some(BucketState {
                tokens,
                last_refill,
            }),
            _ => None,
        })
    }

    fn backend_name(&self) -> &'static str {
        "dragonfly"
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Bucket store client closed");
        }
    }
}

/// In-memory storage entry with expiration
#[derive(Debug, Clone, Copy)]
struct MemoryEntry {
    state: BucketState,
    expires_at: u64,
}

/// In-memory storage backend for development/single instance
#[derive(Default)]
pub struct InMemoryBucketStore {
    buckets: Mutex<HashMap<String, MemoryEntry>>,
}

impl InMemoryBucketStore {
    /// Create a new in-memory storage backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live and not yet collected entries
    pub async fn len(&self) -> usize {
        self.buckets.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.buckets.lock().await.is_empty()
    }

    async fn remove_expired(&self, now: u64) -> usize {
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        buckets.retain(|_, entry| entry.expires_at > now);
        before - buckets.len()
    }
}

#[async_trait]
impl BucketStore for InMemoryBucketStore {
    async fn consume(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        now: u64,
    ) -> Result<ConsumeOutcome, StoreError> {
        let mut buckets = self.buckets.lock().await;

        let current = buckets
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.state)
            .unwrap_or_else(|| BucketState::full(policy, now));

        let mut state = current.refilled(policy, now);
        let allowed = state.try_consume();

        buckets.insert(
            key.to_string(),
            MemoryEntry {
                state,
                expires_at: now.saturating_add(policy.ttl_micros()),
            },
        );

        Ok(ConsumeOutcome { allowed, state })
    }

    async fn load(&self, key: &str, now: u64) -> Result<Option<BucketState>, StoreError> {
        let buckets = self.buckets.lock().await;
        Ok(buckets
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.state))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn cleanup(&self) {
        let removed = self.remove_expired(current_time_micros()).await;
        debug!(removed, "Completed rate limit storage cleanup");
    }

    async fn close(&self) {
        self.buckets.lock().await.clear();
    }
}
