//! Tracing subscriber setup

use crate::config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// File name prefix of the rolling log
pub const LOG_FILE_PREFIX: &str = "riglog.log";

/// Filter directive used when `RUST_LOG` is unset
pub fn default_directive(config: &LoggingConfig, verbose: bool) -> &str {
    if verbose {
        "debug"
    } else {
        config.level.as_str()
    }
}

/// Install the global subscriber.
///
/// Console output goes to stderr. With a log directory configured, a
/// daily-rolling file is written as well; keep the returned guard alive
/// until exit so buffered lines are flushed.
pub fn init_tracing(config: &LoggingConfig, verbose: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(config, verbose)))?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if config.json {
        layers.push(fmt::layer().json().with_writer(std::io::stderr).boxed());
    } else {
        layers.push(fmt::layer().with_writer(std::io::stderr).boxed());
    }

    let guard = match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(fmt::layer().with_ansi(false).with_writer(writer).boxed());
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry().with(layers).with(filter).try_init()?;
    Ok(guard)
}
