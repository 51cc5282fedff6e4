//! Tracing subscriber setup for the CLI

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Pick the filter: `RUST_LOG` wins, then the flags, then the config level
pub fn filter_directive(config: &LoggingConfig, verbose: bool, quiet: bool) -> String {
    if verbose {
        "debug".to_string()
    } else if quiet {
        "error".to_string()
    } else {
        config.level.clone()
    }
}

/// Install the global subscriber.
///
/// Console output goes to stderr. When `config.directory` is set a daily
/// JSON log file is written there too; keep the returned guard alive until
/// exit so it is flushed.
pub fn init_logging(config: &LoggingConfig, verbose: bool, quiet: bool) -> Result<Option<WorkerGuard>> {
    let directive = filter_directive(config, verbose, quiet);
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive));

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter());

    let Some(dir) = &config.directory else {
        tracing_subscriber::registry()
            .with(console)
            .try_init()
            .context("failed to install tracing subscriber")?;
        return Ok(None);
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "chaino.log"));
    let file = fmt::layer()
        .with_writer(writer)
        .json()
        .with_filter(filter());

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(Some(guard))
}
