//! Infrastructure Layer - Shared store clients and the rate limiting engine

pub mod rate_limiter;

pub use rate_limiter::RateLimiterService;
