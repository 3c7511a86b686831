//! Structured logging with tracing

use tracing_subscriber::{
    EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError,
};

use crate::config::LoggingConfig;

/// Failure installing the global subscriber
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter '{directive}': {source}")]
    Filter {
        directive: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("failed to install tracing subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), LoggingError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|source| LoggingError::Filter {
            directive: config.level.clone(),
            source,
        })?,
    };

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init()?,
        "compact" => registry.with(fmt::layer().compact()).try_init()?,
        _ => registry
            .with(fmt::layer().pretty().with_target(true))
            .try_init()?,
    }

    tracing::info!(
        log_level = %config.level,
        log_format = %config.format,
        "Tracing initialized"
    );

    Ok(())
}
