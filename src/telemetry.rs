//! Tracing setup for the one-shot applier.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LoggingConfig};

#[derive(Clone)]
pub struct TelemetryConfig {
    pub verbosity: u8,
    pub logging: LoggingConfig,
}

impl TelemetryConfig {
    pub fn new(verbosity: u8, logging: LoggingConfig) -> Self {
        Self { verbosity, logging }
    }
}

pub fn init(config: TelemetryConfig) {
    let filter = EnvFilter::builder()
        .with_default_directive(level_from_verbosity(config.verbosity).into())
        .with_env_var("GP_LOG")
        .from_env_lossy();

    Registry::default()
        .with(build_stdout_layer(config.logging.stdout_format))
        .with(filter)
        .init();
}

fn build_stdout_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Pretty => Box::new(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(std::io::stderr)
                .with_target(true),
        ),
        LogFormat::Compact => Box::new(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(true),
        ),
        LogFormat::Json => Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_current_span(true),
        ),
    }
}

fn level_from_verbosity(verbosity: u8) -> tracing::metadata::LevelFilter {
    match verbosity {
        0 => tracing::metadata::LevelFilter::ERROR,
        1 => tracing::metadata::LevelFilter::INFO,
        _ => tracing::metadata::LevelFilter::DEBUG,
    }
}
