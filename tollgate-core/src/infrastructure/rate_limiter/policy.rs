//! Rate limit policies and path-prefix resolution
//!
//! A policy belongs to a route, not to a bucket: the resolver maps every
//! request to one named [`PolicyRule`] and the engine applies it to whatever
//! bucket state the store holds, so edits to the table take effect on
//! existing buckets immediately.

use serde::Serialize;

use super::errors::PolicyError;
use super::types::{MICROS_PER_SEC, MICROS_PER_TOKEN};
use crate::config::{PolicyConfig, RateLimitConfig};

/// Name of the fallback policy applied to unmatched paths
pub const DEFAULT_POLICY_NAME: &str = "default";

/// Upper bound for `burst_limit * window_seconds`.
///
/// Keeps every intermediate product of the refill arithmetic below 2^53 so the
/// store-side script computes exactly the same integers as [`BucketState`](super::types::BucketState).
pub const MAX_BURST_WINDOW_PRODUCT: u64 = 1_000_000_000;

/// Validated `{limit, window, burst}` triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitPolicy {
    limit: u64,
    window_seconds: u64,
    burst_limit: u64,
}

impl RateLimitPolicy {
    /// Build a policy, rejecting non-positive values and bursts below the limit
    pub fn new(limit: i64, window_seconds: i64, burst_limit: i64) -> Result<Self, PolicyError> {
        if limit <= 0 {
            return Err(PolicyError::NonPositiveLimit(limit));
        }
        if window_seconds <= 0 {
            return Err(PolicyError::NonPositiveWindow(window_seconds));
        }
        if burst_limit < limit {
            return Err(PolicyError::BurstBelowLimit { limit, burst_limit });
        }

        let product = burst_limit as u128 * window_seconds as u128;
        if product > MAX_BURST_WINDOW_PRODUCT as u128 {
            return Err(PolicyError::OutOfRange {
                product,
                max: MAX_BURST_WINDOW_PRODUCT,
            });
        }

        Ok(Self {
            limit: limit as u64,
            window_seconds: window_seconds as u64,
            burst_limit: burst_limit as u64,
        })
    }

    /// Admissions allowed per window
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Refill window in seconds
    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    /// Maximum credits a bucket can hold
    pub fn burst_limit(&self) -> u64 {
        self.burst_limit
    }

    /// Bucket capacity in micro-tokens
    pub fn burst_micros(&self) -> u64 {
        self.burst_limit * MICROS_PER_TOKEN
    }

    /// Microseconds needed to refill an empty bucket to `burst_limit`.
    ///
    /// Elapsed time beyond this yields no additional credit, so refill math
    /// clamps to it.
    pub fn full_refill_micros(&self) -> u64 {
        let numerator = self.burst_micros() as u128 * self.window_seconds as u128;
        numerator.div_ceil(self.limit as u128) as u64
    }

    /// Inactivity TTL for stored buckets (two windows), in milliseconds
    pub fn ttl_millis(&self) -> u64 {
        self.window_seconds * 2 * 1_000
    }

    /// Inactivity TTL for stored buckets, in microseconds
    pub fn ttl_micros(&self) -> u64 {
        self.window_seconds * 2 * MICROS_PER_SEC
    }
}

impl TryFrom<&PolicyConfig> for RateLimitPolicy {
    type Error = PolicyError;

    fn try_from(config: &PolicyConfig) -> Result<Self, Self::Error> {
        RateLimitPolicy::new(config.limit, config.window_seconds, config.burst_limit)
    }
}

/// A named policy bound to a path prefix and optional method filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyRule {
    name: String,
    prefix: String,
    methods: Vec<String>,
    policy: RateLimitPolicy,
}

impl PolicyRule {
    pub fn new(
        name: impl Into<String>,
        prefix: impl Into<String>,
        methods: Vec<String>,
        policy: RateLimitPolicy,
    ) -> Result<Self, PolicyError> {
        let name = name.into();
        let prefix = prefix.into();

        if name.trim().is_empty() {
            return Err(PolicyError::EmptyName);
        }
        if prefix.trim().is_empty() {
            return Err(PolicyError::EmptyPrefix(name));
        }

        Ok(Self {
            name,
            prefix,
            methods: methods.into_iter().map(|m| m.to_ascii_uppercase()).collect(),
            policy,
        })
    }

    fn fallback(policy: RateLimitPolicy) -> Self {
        Self {
            name: DEFAULT_POLICY_NAME.to_string(),
            prefix: "/".to_string(),
            methods: Vec::new(),
            policy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Upper-cased method filter; empty means any method
    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    fn matches_method(&self, method: &str) -> bool {
        self.methods.is_empty() || self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    }

    /// Length of the matched prefix, if the rule applies to this request
    fn match_len(&self, path: &str, method: &str) -> Option<usize> {
        if !self.matches_method(method) {
            return None;
        }
        prefix_match_len(&self.prefix, path)
    }
}

/// Segment-aware prefix match: `/api/v1/billing/` matches `/api/v1/billing`
/// and `/api/v1/billing/x` but not `/api/v1/billingx`.
pub(super) fn prefix_match_len(prefix: &str, path: &str) -> Option<usize> {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        return Some(0);
    }

    let rest = path.strip_prefix(trimmed)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(trimmed.len())
    } else {
        None
    }
}

/// Ordered prefix → policy table with a default fallback
#[derive(Debug, Clone)]
pub struct PolicyTable {
    default: PolicyRule,
    rules: Vec<PolicyRule>,
}

impl PolicyTable {
    pub fn new(default: RateLimitPolicy, rules: Vec<PolicyRule>) -> Result<Self, PolicyError> {
        let mut seen = vec![DEFAULT_POLICY_NAME];
        for rule in &rules {
            if seen.contains(&rule.name()) {
                return Err(PolicyError::DuplicateName(rule.name.clone()));
            }
            seen.push(rule.name());
        }

        Ok(Self {
            default: PolicyRule::fallback(default),
            rules,
        })
    }

    /// Build and validate the table described by configuration
    pub fn from_config(config: &RateLimitConfig) -> Result<Self, PolicyError> {
        let default = RateLimitPolicy::try_from(&config.default_policy)?;
        let rules = config
            .rules
            .iter()
            .map(|rule| {
                let policy =
                    RateLimitPolicy::new(rule.limit, rule.window_seconds, rule.burst_limit)?;
                PolicyRule::new(&rule.name, &rule.prefix, rule.methods.clone(), policy)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(default, rules)
    }

    /// Longest matching prefix wins; unmatched requests get the default policy.
    ///
    /// Ties keep the rule listed first.
    pub fn resolve(&self, path: &str, method: &str) -> &PolicyRule {
        let mut best: Option<(usize, &PolicyRule)> = None;

        for rule in &self.rules {
            if let Some(len) = rule.match_len(path, method)
                && best.is_none_or(|(best_len, _)| len > best_len)
            {
                best = Some((len, rule));
            }
        }

        best.map(|(_, rule)| rule).unwrap_or(&self.default)
    }

    /// Look up a rule by its limit-type name (`default` included)
    pub fn by_name(&self, name: &str) -> Option<&PolicyRule> {
        if name == DEFAULT_POLICY_NAME {
            return Some(&self.default);
        }
        self.rules.iter().find(|rule| rule.name == name)
    }

    /// Every rule, default first
    pub fn iter(&self) -> impl Iterator<Item = &PolicyRule> {
        std::iter::once(&self.default).chain(self.rules.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard_table() -> PolicyTable {
        PolicyTable::from_config(&RateLimitConfig::default()).unwrap()
    }

    #[test]
    fn test_policy_rejects_non_positive_values() {
        assert_eq!(
            RateLimitPolicy::new(0, 60, 10),
            Err(PolicyError::NonPositiveLimit(0))
        );
        assert_eq!(
            RateLimitPolicy::new(10, -1, 10),
            Err(PolicyError::NonPositiveWindow(-1))
        );
        assert_eq!(
            RateLimitPolicy::new(10, 60, 5),
            Err(PolicyError::BurstBelowLimit {
                limit: 10,
                burst_limit: 5
            })
        );
        assert!(matches!(
            RateLimitPolicy::new(1, 86_400, 1_000_000),
            Err(PolicyError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_full_refill_time() {
        // 20 tokens at 10 per 60s takes 120s
        let policy = RateLimitPolicy::new(10, 60, 20).unwrap();
        assert_eq!(policy.full_refill_micros(), 120 * MICROS_PER_SEC);
        assert_eq!(policy.ttl_millis(), 120_000);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let table = standard_table();

        let billing = table.resolve("/api/v1/billing/x", "POST");
        assert_eq!(billing.name(), "billing");
        assert_eq!(billing.policy().limit(), 20);

        let fallback = table.resolve("/api/v1/", "GET");
        assert_eq!(fallback.name(), DEFAULT_POLICY_NAME);
        assert_eq!(fallback.policy().limit(), 100);
    }

    #[test]
    fn test_standard_table_values() {
        let table = standard_table();
        let expected = [
            ("/api/v1/ai/generate", "ai_generation", 50, 100),
            ("/api/v1/billing/invoices", "billing", 20, 40),
            ("/api/v1/privacy/export", "privacy", 10, 20),
            ("/api/v1/analytics/events", "analytics", 200, 400),
            ("/api/v1/webhooks/stripe", "webhooks", 1000, 2000),
            ("/api/v1/posts", "default", 100, 200),
        ];

        for (path, name, limit, burst) in expected {
            let rule = table.resolve(path, "POST");
            assert_eq!(rule.name(), name, "path {}", path);
            assert_eq!(rule.policy().limit(), limit);
            assert_eq!(rule.policy().window_seconds(), 60);
            assert_eq!(rule.policy().burst_limit(), burst);
        }
    }

    #[test]
    fn test_prefix_respects_segment_boundaries() {
        let table = standard_table();
        assert_eq!(table.resolve("/api/v1/billing", "GET").name(), "billing");
        assert_eq!(table.resolve("/api/v1/billingx", "GET").name(), "default");
    }

    #[test]
    fn test_method_filter() {
        let strict = RateLimitPolicy::new(5, 60, 5).unwrap();
        let rule = PolicyRule::new(
            "post_writes",
            "/api/v1/posts",
            vec!["post".to_string()],
            strict,
        )
        .unwrap();
        let table =
            PolicyTable::new(RateLimitPolicy::new(100, 60, 200).unwrap(), vec![rule]).unwrap();

        assert_eq!(table.resolve("/api/v1/posts", "POST").name(), "post_writes");
        assert_eq!(table.resolve("/api/v1/posts", "GET").name(), "default");
    }

    #[test]
    fn test_nested_prefix_beats_outer_prefix() {
        let outer = PolicyRule::new(
            "admin",
            "/api/v1/admin/",
            vec![],
            RateLimitPolicy::new(30, 60, 30).unwrap(),
        )
        .unwrap();
        let inner = PolicyRule::new(
            "admin_exports",
            "/api/v1/admin/exports/",
            vec![],
            RateLimitPolicy::new(2, 60, 2).unwrap(),
        )
        .unwrap();
        let table = PolicyTable::new(
            RateLimitPolicy::new(100, 60, 200).unwrap(),
            vec![outer, inner],
        )
        .unwrap();

        assert_eq!(
            table.resolve("/api/v1/admin/exports/42", "GET").name(),
            "admin_exports"
        );
        assert_eq!(table.resolve("/api/v1/admin/users", "GET").name(), "admin");
    }

    #[test]
    fn test_duplicate_and_reserved_names_rejected() {
        let policy = RateLimitPolicy::new(10, 60, 10).unwrap();
        let a = PolicyRule::new("dup", "/a", vec![], policy).unwrap();
        let b = PolicyRule::new("dup", "/b", vec![], policy).unwrap();
        assert_eq!(
            PolicyTable::new(policy, vec![a, b]).unwrap_err(),
            PolicyError::DuplicateName("dup".to_string())
        );

        let reserved = PolicyRule::new(DEFAULT_POLICY_NAME, "/c", vec![], policy).unwrap();
        assert!(PolicyTable::new(policy, vec![reserved]).is_err());
    }

    #[test]
    fn test_by_name() {
        let table = standard_table();
        assert_eq!(table.by_name("privacy").unwrap().policy().limit(), 10);
        assert_eq!(table.by_name("default").unwrap().policy().limit(), 100);
        assert!(table.by_name("nope").is_none());
        assert_eq!(table.iter().count(), 6);
    }
}
