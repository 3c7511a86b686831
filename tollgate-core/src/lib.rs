//! Tollgate Core - Foundation crate for the tollgate admission controller
//!
//! This crate provides everything below the HTTP layer:
//!
//! # Modules
//!
//! - [`config`] — Strongly-typed configuration with TOML and environment variable support
//! - [`infrastructure`] — The distributed token bucket: policies, key derivation,
//!   bucket stores and the rate limiter service
//! - [`logging`] — Structured logging with tracing
//!
//! # Configuration
//!
//! Load configuration from files and environment:
//!
//! ```rust,ignore
//! use tollgate_core::Config;
//!
//! let config = Config::load()?;
//! ```
//!
//! Environment variables use the `TOLLGATE__` prefix with double underscore separators:
//!
//! ```bash
//! TOLLGATE__STORE__URL=redis://dragonfly:6379
//! TOLLGATE__RATE_LIMIT__DEFAULT_POLICY__LIMIT=100
//! ```
//!
//! # Logging
//!
//! ```rust,ignore
//! use tollgate_core::init_tracing;
//!
//! init_tracing(&config.logging)?;
//! ```

pub mod config;
pub mod infrastructure;
pub mod logging;

pub use config::Config;
pub use logging::init_tracing;
