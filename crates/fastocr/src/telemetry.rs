//! Logging setup.
//!
//! The library logs through the `log` facade and `tracing` spans. This
//! installs a `tracing-subscriber` formatter and forwards `log` records into
//! it through `tracing-log`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::error::FastOcrError;

pub const DEFAULT_FILTER: &str = "info";

/// Builds the filter from `RUST_LOG`, falling back to `default_filter`.
pub fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber. Fails if logging was already set up.
pub fn init_logging(default_filter: &str, json: bool) -> Result<(), FastOcrError> {
    tracing_log::LogTracer::init().map_err(|e| FastOcrError::Logging(e.to_string()))?;

    let layer: Box<dyn Layer<Registry> + Send + Sync> = if json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    let subscriber = Registry::default()
        .with(layer)
        .with(env_filter(default_filter));

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| FastOcrError::Logging(e.to_string()))
}
