//! Application setup and wiring

use std::sync::Arc;

use axum::Router;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tollgate_core::Config;
use tollgate_core::infrastructure::RateLimiterService;
use tollgate_gateway::presentation::{AppState, create_router};

/// Handle returned from create_app for graceful shutdown coordination
pub struct AppHandle {
    pub router: Router,
    pub shutdown_token: CancellationToken,
    /// Shared limiter; close its store once the server has drained
    pub rate_limiter: Arc<RateLimiterService>,
    /// Periodic store cleanup, stopped by `shutdown_token`
    pub cleanup_task: JoinHandle<()>,
}

/// Create the application router with no protected API of its own.
///
/// Every non-exempt request, including unmatched paths, still passes through
/// admission control.
pub async fn create_app(
    config: Config,
) -> Result<AppHandle, Box<dyn std::error::Error + Send + Sync>> {
    create_app_with_api(config, Router::new()).await
}

/// Create the application router around `api`, the routes to protect
pub async fn create_app_with_api(
    config: Config,
    api: Router,
) -> Result<AppHandle, Box<dyn std::error::Error + Send + Sync>> {
    let shutdown_token = CancellationToken::new();

    let rate_limiter = Arc::new(
        RateLimiterService::connect(config.rate_limit.clone(), &config.store).await?,
    );

    tracing::info!(
        enabled = rate_limiter.is_enabled(),
        backend = rate_limiter.backend_name(),
        policies = rate_limiter.policies().iter().count(),
        "Rate limiter initialized"
    );

    let cleanup_task = Arc::clone(&rate_limiter).start_cleanup_task(shutdown_token.clone());

    let router = create_router(AppState::new(Arc::clone(&rate_limiter)), &config, api);

    Ok(AppHandle {
        router,
        shutdown_token,
        rate_limiter,
        cleanup_task,
    })
}
