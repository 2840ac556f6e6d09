//! Tracing setup for the CLI.
//!
//! Events go to stderr so command results on stdout stay machine-readable. `log::`
//! records from sqlx are bridged into the same subscriber.

use log::LevelFilter;
use thiserror::Error;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
};

use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("invalid log filter {filter:?}: {source}")]
    Filter {
        filter: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Build the filter from `RUST_LOG`, falling back to the configured level.
fn env_filter(config: &AppConfig) -> Result<EnvFilter, TelemetryInitError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.log_level).map_err(|source| TelemetryInitError::Filter {
        filter: config.log_level.clone(),
        source,
    })
}

/// Install the global subscriber. Calling it again is a no-op.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryInitError> {
    // Fails only when a logger is already registered, which is fine.
    let _ = LogTracer::builder()
        .with_max_level(LevelFilter::Debug)
        .init();

    let filter = env_filter(config)?;
    let layer = match config.log_format.as_str() {
        "pretty" => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .boxed(),
        _ => fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(layer);
    match tracing::subscriber::set_global_default(subscriber) {
        Ok(()) => Ok(()),
        Err(_) if tracing::dispatcher::has_been_set() => Ok(()),
        Err(err) => Err(err.into()),
    }
}
