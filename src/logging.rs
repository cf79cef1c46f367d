//! Tracing subscriber setup.
//!
//! Console output is always on (human-readable or JSON). A daily rolling file
//! can be added; its writer is non-blocking, so the returned guard must be
//! kept alive for the life of the process or buffered lines are lost.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "tokenrelay.log";

/// Filter from `RUST_LOG` if set, otherwise `default_level`.
pub fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Map `-v` repetitions onto a filter directive, falling back to the config.
pub fn level_for_verbosity(verbose: u8, configured: &str) -> String {
    match verbose {
        0 => configured.to_string(),
        1 => "info,tokenrelay=debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install the global subscriber.
pub fn init(config: &LoggingConfig, level: &str) -> anyhow::Result<Option<WorkerGuard>> {
    let console = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = if config.file {
        let dir = config.log_dir();
        std::fs::create_dir_all(&dir)?;
        let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(build_filter(level))
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    if guard.is_some() {
        tracing::debug!("Writing logs to {}", config.log_dir().display());
    }
    Ok(guard)
}
