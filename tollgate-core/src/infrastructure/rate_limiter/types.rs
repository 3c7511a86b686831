//! Rate limiter types and core data structures

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::policy::{PolicyRule, RateLimitPolicy};

/// Micro-tokens per admission credit
pub const MICROS_PER_TOKEN: u64 = 1_000_000;

/// Microseconds per second
pub const MICROS_PER_SEC: u64 = 1_000_000;

/// Identity attributes resolved by upstream auth.
///
/// Values are opaque; the limiter never authenticates them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestIdentity {
    pub organization_id: Option<String>,
    pub user_id: Option<String>,
}

impl RequestIdentity {
    pub fn organization(id: impl Into<String>) -> Self {
        Self {
            organization_id: Some(id.into()),
            user_id: None,
        }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self {
            organization_id: None,
            user_id: Some(id.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// Subject a bucket is charged to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateLimitKey {
    /// Whole organization, shared by all of its members
    Organization(String),
    /// Individual user outside any organization
    User(String),
    /// Source address fallback
    Ip(String),
}

impl RateLimitKey {
    /// Pick the most specific billable identity: organization > user > IP
    pub fn derive(identity: &RequestIdentity, ip: &str) -> Self {
        if let Some(org) = non_blank(identity.organization_id.as_deref()) {
            return RateLimitKey::Organization(org.to_string());
        }
        if let Some(user) = non_blank(identity.user_id.as_deref()) {
            return RateLimitKey::User(user.to_string());
        }
        match non_blank(Some(ip)) {
            Some(ip) => RateLimitKey::Ip(ip.to_string()),
            None => RateLimitKey::Ip("unknown-ip".to_string()),
        }
    }

    /// `org:<id>`, `user:<id>` or `ip:<addr>`
    pub fn subject(&self) -> String {
        match self {
            RateLimitKey::Organization(id) => format!("org:{}", id),
            RateLimitKey::User(id) => format!("user:{}", id),
            RateLimitKey::Ip(ip) => format!("ip:{}", ip),
        }
    }

    /// Store key scoped to one subject and one policy
    pub fn to_redis_key(&self, prefix: &str, policy_name: &str) -> String {
        format!("{}:{}:{}", prefix, policy_name, self.subject())
    }
}

impl std::fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.subject())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Stored bucket: micro-tokens plus the last refill time in epoch microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketState {
    pub tokens: u64,
    pub last_refill: u64,
}

impl BucketState {
    /// A fresh bucket holding the full burst
    pub fn full(policy: &RateLimitPolicy, now: u64) -> Self {
        Self {
            tokens: policy.burst_micros(),
            last_refill: now,
        }
    }

    /// Apply elapsed-time refill, capped at the burst limit.
    ///
    /// Negative elapsed time (clock skew) counts as zero and `last_refill`
    /// never moves backwards.
    pub fn refilled(self, policy: &RateLimitPolicy, now: u64) -> Self {
        let elapsed = now
            .saturating_sub(self.last_refill)
            .min(policy.full_refill_micros());
        let refill = elapsed as u128 * policy.limit() as u128 / policy.window_seconds() as u128;

        Self {
            tokens: self
                .tokens
                .saturating_add(refill as u64)
                .min(policy.burst_micros()),
            last_refill: self.last_refill.max(now),
        }
    }

    /// Spend one credit if a whole one is available
    pub fn try_consume(&mut self) -> bool {
        if self.tokens >= MICROS_PER_TOKEN {
            self.tokens -= MICROS_PER_TOKEN;
            true
        } else {
            false
        }
    }

    /// Whole credits left
    pub fn remaining(&self) -> u64 {
        self.tokens / MICROS_PER_TOKEN
    }

    /// Seconds until one whole credit is available: `ceil((1 - tokens) * window / limit)`
    pub fn retry_after(&self, policy: &RateLimitPolicy) -> u64 {
        let deficit = MICROS_PER_TOKEN.saturating_sub(self.tokens) as u128;
        let numerator = deficit * policy.window_seconds() as u128;
        let denominator = policy.limit() as u128 * MICROS_PER_TOKEN as u128;
        numerator.div_ceil(denominator) as u64
    }
}

/// Outcome of one admission check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Whether the request is admitted
    pub allowed: bool,
    /// Name of the policy that was applied
    pub policy: String,
    /// Admissions per window for that policy
    pub limit: u64,
    pub window_seconds: u64,
    /// Whole credits left after this check
    pub remaining: u64,
    /// Seconds to wait before retrying (0 when admitted)
    pub retry_after: u64,
    /// Epoch seconds estimate for a full window from now
    pub reset_at: u64,
    /// Set when the store could not be consulted and the request was admitted anyway
    pub degraded: bool,
}

impl Decision {
    pub fn admitted(rule: &PolicyRule, state: &BucketState, now: u64) -> Self {
        Self::from_state(rule, state, true, 0, now)
    }

    pub fn denied(rule: &PolicyRule, state: &BucketState, now: u64) -> Self {
        let retry_after = state.retry_after(rule.policy());
        Self::from_state(rule, state, false, retry_after, now)
    }

    /// Admit without consulting the store
    pub fn fail_open(rule: &PolicyRule, now: u64) -> Self {
        let policy = rule.policy();
        Self {
            allowed: true,
            policy: rule.name().to_string(),
            limit: policy.limit(),
            window_seconds: policy.window_seconds(),
            remaining: policy.limit(),
            retry_after: 0,
            reset_at: reset_at(policy, now),
            degraded: true,
        }
    }

    /// Admit because rate limiting is switched off or the path is exempt
    pub fn unlimited() -> Self {
        Self {
            allowed: true,
            policy: String::new(),
            limit: u64::MAX,
            window_seconds: 0,
            remaining: u64::MAX,
            retry_after: 0,
            reset_at: 0,
            degraded: false,
        }
    }

    fn from_state(
        rule: &PolicyRule,
        state: &BucketState,
        allowed: bool,
        retry_after: u64,
        now: u64,
    ) -> Self {
        let policy = rule.policy();
        Self {
            allowed,
            policy: rule.name().to_string(),
            limit: policy.limit(),
            window_seconds: policy.window_seconds(),
            remaining: state.remaining(),
            retry_after,
            reset_at: reset_at(policy, now),
            degraded: false,
        }
    }
}

/// Read-only projection of what the next check would see
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketStatus {
    pub policy: String,
    /// Store key the projection was read from
    pub key: String,
    pub limit: u64,
    pub window_seconds: u64,
    pub burst_limit: u64,
    /// Whole credits available right now
    pub remaining: u64,
    pub reset_at: u64,
    pub degraded: bool,
}

/// `now + window_seconds`, in epoch seconds
pub fn reset_at(policy: &RateLimitPolicy, now: u64) -> u64 {
    now / MICROS_PER_SEC + policy.window_seconds()
}

/// Get current time in microseconds since Unix epoch
pub fn current_time_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_micros() as u64
}
