//! Tollgate - Main application entry point
//!
//! This application starts the HTTP admission gateway.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;

use tollgate::{Config, create_app, init_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    run_server().await
}

/// Run the HTTP server
async fn run_server() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = dotenvy::dotenv() {
        // Only warn if it's not a "file not found" error
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Load and validate configuration; invalid policies are fatal here
    let config = Config::load().map_err(|e| {
        std::io::Error::other(format!(
            "Failed to load configuration. Check config/*.toml and TOLLGATE__* env vars: {}",
            e
        ))
    })?;

    // Initialize tracing (after config is loaded so we can use logging config)
    init_tracing(&config.logging)?;

    tracing::info!("Starting Tollgate server...");
    tracing::info!(
        "Configuration loaded: server={}:{}",
        config.server.host,
        config.server.port
    );

    let server_host = config.server.host.clone();
    let server_port = config.server.port;
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);

    let app_handle = create_app(config).await.map_err(|e| {
        Box::new(std::io::Error::other(format!(
            "Failed to create application: {}",
            e
        )))
    })?;

    let addr = SocketAddr::new(server_host.parse()?, server_port);
    tracing::info!("Server listening on {}", addr);

    // Start server with graceful shutdown; peer addresses feed IP keying
    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app_handle
            .router
            .into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(app_handle.shutdown_token.clone()))
    .await?;

    // Server drained; stop background work and release the store
    app_handle.shutdown_token.cancel();
    if tokio::time::timeout(shutdown_timeout, app_handle.cleanup_task)
        .await
        .is_err()
    {
        tracing::warn!("Cleanup task did not stop within the shutdown timeout");
    }
    app_handle.rate_limiter.shutdown().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then cancel background tasks
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }

    tracing::info!("Cancelling background tasks...");
    shutdown_token.cancel();
}
