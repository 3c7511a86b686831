//! Configuration validation module

use crate::config::{
    LoggingConfig, RateLimitConfig, RateLimitStorageBackend, ServerConfig, StoreConfig,
};
use crate::infrastructure::rate_limiter::PolicyTable;

/// Trait for validating configuration sections
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Server configuration error: {message}")]
    Server { message: String },

    #[error("Logging configuration error: {message}")]
    Logging { message: String },

    #[error("Store configuration error: {message}")]
    Store { message: String },

    #[error("Rate limit configuration error: {message}")]
    RateLimit { message: String },
}

impl ValidationError {
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    pub fn logging(message: impl Into<String>) -> Self {
        Self::Logging {
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit {
            message: message.into(),
        }
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        // u16 cannot exceed 65535, so only 0 is out of range
        if self.port == 0 {
            return Err(ValidationError::server(format!(
                "Port must be in range 1-65535, got {}",
                self.port
            )));
        }

        if self.host.is_empty() {
            return Err(ValidationError::server("Host cannot be empty"));
        }

        if self.request_timeout_seconds == 0 {
            return Err(ValidationError::server(
                "Request timeout must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Validate for LoggingConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if !matches!(self.format.as_str(), "json" | "pretty" | "compact") {
            return Err(ValidationError::logging(format!(
                "Log format must be one of: json, pretty, compact; got {}",
                self.format
            )));
        }

        if self.level.trim().is_empty() {
            return Err(ValidationError::logging("Log level cannot be empty"));
        }

        Ok(())
    }
}

impl Validate for StoreConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
            return Err(ValidationError::store(format!(
                "Store url must start with redis:// or rediss://, got: {}",
                self.url
            )));
        }

        if self.connection_timeout_ms == 0 {
            return Err(ValidationError::store(
                "connection_timeout_ms must be greater than 0",
            ));
        }

        if self.response_timeout_ms == 0 {
            return Err(ValidationError::store(
                "response_timeout_ms must be greater than 0",
            ));
        }

        if let Some(db) = self.database
            && db < 0
        {
            return Err(ValidationError::store(format!(
                "database index must not be negative, got {}",
                db
            )));
        }

        Ok(())
    }
}

impl Validate for RateLimitConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.key_prefix.trim().is_empty() {
            return Err(ValidationError::rate_limit("key_prefix cannot be empty"));
        }

        if self.storage_backend == RateLimitStorageBackend::Memory
            && self.cleanup_interval_seconds == 0
        {
            return Err(ValidationError::rate_limit(
                "cleanup_interval_seconds must be greater than 0 for the memory backend",
            ));
        }

        if let Some(path) = self.exempt_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(ValidationError::rate_limit(format!(
                "exempt path must start with '/', got: {}",
                path
            )));
        }

        if let Some(path) = self
            .exempt_paths
            .iter()
            .find(|p| p.trim().trim_end_matches('/').is_empty())
        {
            return Err(ValidationError::rate_limit(format!(
                "exempt path '{}' would exempt every request",
                path
            )));
        }

        // Building the table applies every policy rule check
        PolicyTable::from_config(self).map_err(|e| ValidationError::rate_limit(e.to_string()))?;

        Ok(())
    }
}
