//! Configuration management

pub mod validation;

pub use validation::{Validate, ValidationError};

use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub store: StoreConfig,
    pub rate_limit: RateLimitConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Global request timeout in seconds applied at the HTTP layer.
    pub request_timeout_seconds: u64,
    /// Seconds to wait for background tasks to stop once the server has drained
    pub shutdown_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            request_timeout_seconds: 30,
            shutdown_timeout_seconds: 10,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence when set
    pub level: String,
    /// `json`, `pretty` or `compact`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

/// Shared bucket store (Dragonfly / Redis protocol) connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Connection URL (e.g., "redis://127.0.0.1:6379")
    pub url: String,
    /// Overrides the username in the URL
    pub username: Option<String>,
    /// Overrides the password in the URL
    pub password: Option<String>,
    /// Logical database index; overrides the one in the URL
    pub database: Option<i64>,
    /// Connect timeout in milliseconds
    pub connection_timeout_ms: u64,
    /// Per-command response timeout in milliseconds
    pub response_timeout_ms: u64,
    /// Start on the in-memory store if the shared store is unreachable at startup
    pub fallback_to_memory: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            username: None,
            password: None,
            database: None,
            connection_timeout_ms: 5_000,
            response_timeout_ms: 2_000,
            fallback_to_memory: true,
        }
    }
}

/// Storage backend for rate limiting
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitStorageBackend {
    /// Use Dragonfly/Redis for distributed rate limiting (recommended for production)
    #[default]
    Dragonfly,
    /// Use in-memory storage (suitable for development/single instance)
    Memory,
}

/// Raw `{limit, window, burst}` values; validated into `RateLimitPolicy` at load time
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyConfig {
    pub limit: i64,
    pub window_seconds: i64,
    pub burst_limit: i64,
}

impl PolicyConfig {
    pub const fn new(limit: i64, window_seconds: i64, burst_limit: i64) -> Self {
        Self {
            limit,
            window_seconds,
            burst_limit,
        }
    }
}

/// One named path-prefix rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyRuleConfig {
    /// Limit-type name used for introspection and in store keys
    pub name: String,
    pub prefix: String,
    /// Restrict the rule to these HTTP methods; empty applies to all
    #[serde(default)]
    pub methods: Vec<String>,
    pub limit: i64,
    pub window_seconds: i64,
    pub burst_limit: i64,
}

impl PolicyRuleConfig {
    fn new(name: &str, prefix: &str, policy: PolicyConfig) -> Self {
        Self {
            name: name.to_string(),
            prefix: prefix.to_string(),
            methods: Vec::new(),
            limit: policy.limit,
            window_seconds: policy.window_seconds,
            burst_limit: policy.burst_limit,
        }
    }
}

/// Rate limiting configuration
///
/// Policies are resolved per request by longest matching path prefix; the
/// default policy covers everything else. AI generation, billing and privacy
/// routes are deliberately tighter than general traffic, inbound webhooks much
/// looser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled
    pub enabled: bool,
    /// Storage backend for bucket state
    pub storage_backend: RateLimitStorageBackend,
    /// Namespace prepended to every store key
    pub key_prefix: String,
    /// Cleanup interval for expired in-memory entries in seconds
    pub cleanup_interval_seconds: u64,
    /// Read identity from `X-Organization-Id` / `X-User-Id` set by a trusted edge
    pub trust_identity_headers: bool,
    /// Path prefixes never rate limited (health, docs, schema)
    pub exempt_paths: Vec<String>,
    /// Policy for paths no rule matches
    pub default_policy: PolicyConfig,
    /// Ordered prefix rules
    pub rules: Vec<PolicyRuleConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            storage_backend: RateLimitStorageBackend::Dragonfly,
            key_prefix: "ratelimit".to_string(),
            cleanup_interval_seconds: 300,
            trust_identity_headers: false,
            exempt_paths: vec![
                "/health".to_string(),
                "/docs".to_string(),
                "/redoc".to_string(),
                "/api-docs".to_string(),
                "/openapi.json".to_string(),
                "/api/v1/rate-limit".to_string(),
            ],
            default_policy: PolicyConfig::new(100, 60, 200),
            rules: vec![
                PolicyRuleConfig::new("ai_generation", "/api/v1/ai/", PolicyConfig::new(50, 60, 100)),
                PolicyRuleConfig::new("billing", "/api/v1/billing/", PolicyConfig::new(20, 60, 40)),
                PolicyRuleConfig::new("privacy", "/api/v1/privacy/", PolicyConfig::new(10, 60, 20)),
                PolicyRuleConfig::new(
                    "analytics",
                    "/api/v1/analytics/",
                    PolicyConfig::new(200, 60, 400),
                ),
                PolicyRuleConfig::new(
                    "webhooks",
                    "/api/v1/webhooks/",
                    PolicyConfig::new(1000, 60, 2000),
                ),
            ],
        }
    }
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.logging.validate()?;
        self.store.validate()?;
        self.rate_limit.validate()?;
        Ok(())
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigLoadError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false));

        // Add environment-specific config if ENV is set
        if let Ok(env) = std::env::var("ENV") {
            builder = builder
                .add_source(config::File::with_name(&format!("config/{}", env)).required(false));
        }

        // Add local config and environment variables last (highest priority)
        builder = builder
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("TOLLGATE").separator("__"));

        Self::finish(builder)
    }

    /// Load configuration from a TOML document layered over the defaults
    pub fn from_toml(contents: &str) -> Result<Self, ConfigLoadError> {
        let builder = config::Config::builder()
            .add_source(config::File::from_str(contents, config::FileFormat::Toml));
        Self::finish(builder)
    }

    fn finish(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigLoadError> {
        let config: Config = builder.build()?.try_deserialize()?;

        // Validate the loaded configuration
        config.validate()?;

        Ok(config)
    }
}

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Configuration file error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Validation(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rate_limit.default_policy, PolicyConfig::new(100, 60, 200));
        assert_eq!(config.rate_limit.rules.len(), 5);
    }

    #[test]
    fn test_from_toml_overrides_defaults() {
        let config = Config::from_toml(
            r#"
            [store]
            url = "redis://cache.internal:6380"
            database = 3
            response_timeout_ms = 1500

            [rate_limit]
            storage_backend = "memory"

            [rate_limit.default_policy]
            limit = 50
            window_seconds = 30
            burst_limit = 75
            "#,
        )
        .unwrap();

        assert_eq!(config.store.url, "redis://cache.internal:6380");
        assert_eq!(config.store.database, Some(3));
        assert_eq!(config.store.response_timeout_ms, 1500);
        assert_eq!(config.store.connection_timeout_ms, 5_000);
        assert_eq!(config.rate_limit.storage_backend, RateLimitStorageBackend::Memory);
        assert_eq!(config.rate_limit.default_policy, PolicyConfig::new(50, 30, 75));
        // Rules untouched by the document keep their defaults
        assert_eq!(config.rate_limit.rules.len(), 5);
    }

    #[test]
    fn test_custom_rules_with_methods() {
        let config = Config::from_toml(
            r#"
            [[rate_limit.rules]]
            name = "post_publish"
            prefix = "/api/v1/posts/"
            methods = ["POST"]
            limit = 5
            window_seconds = 60
            burst_limit = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.rate_limit.rules.len(), 1);
        assert_eq!(config.rate_limit.rules[0].methods, vec!["POST".to_string()]);
    }

    #[test]
    fn test_non_positive_policy_is_fatal() {
        let err = Config::from_toml(
            r#"
            [rate_limit.default_policy]
            limit = 0
            window_seconds = 60
            burst_limit = 10
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigLoadError::Validation(_)));

        let err = Config::from_toml(
            r#"
            [[rate_limit.rules]]
            name = "broken"
            prefix = "/api/v1/broken/"
            limit = 10
            window_seconds = -5
            burst_limit = 10
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("window_seconds must be positive"));
    }
}
