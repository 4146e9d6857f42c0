use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::{CoreConfig, LogFormat};
use crate::error::AppError;

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber. Events go to stderr so stdout stays machine-readable.
///
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing(config: &CoreConfig) -> Result<(), AppError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let installed = match config.log_format {
        LogFormat::Json => Registry::default()
            .with(filter)
            .with(JsonStorageLayer)
            .with(BunyanFormattingLayer::new(
                config.service_name.clone(),
                std::io::stderr,
            ))
            .try_init(),
        LogFormat::Pretty => Registry::default()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };

    installed.map_err(|e| AppError::Internal(format!("failed to install tracing subscriber: {}", e)))
}
