//! Gateway API controllers

pub mod health;
pub mod rate_limit;

use std::sync::Arc;

use tollgate_core::infrastructure::rate_limiter::RateLimiterService;

/// Application state shared by the controllers
#[derive(Clone)]
pub struct AppState {
    pub rate_limiter: Arc<RateLimiterService>,
}

impl AppState {
    pub fn new(rate_limiter: Arc<RateLimiterService>) -> Self {
        Self { rate_limiter }
    }
}
