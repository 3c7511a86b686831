//! Tollgate - distributed token-bucket admission control
//!
//! This is the main binary crate that wires the rate limiter core into the
//! HTTP gateway.

mod app;

pub use app::{AppHandle, create_app, create_app_with_api};
pub use tollgate_core::{Config, init_tracing};

// Re-export for convenience
pub use tollgate_core;
pub use tollgate_gateway;
