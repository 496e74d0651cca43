// Local crates
use crate::helpers::load_config::{LogFormat, LoggingConfig};

// External crates
use anyhow::{Context, Result};
use std::panic;
use tracing::error;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    filter::{Directive, EnvFilter},
    fmt,
    prelude::*,
    registry::Registry,
};

const LOG_FILE_NAME: &str = "ves_tail.log";

/// Install the global subscriber.
///
/// Diagnostics go to a daily rolling file under `config.directory` because
/// stdout carries the rendered events. With `verbose` a compact copy is also
/// written to stderr. The returned guard flushes the file writer on drop and
/// must be held until the process exits.
pub fn init_tracing(config: &LoggingConfig, verbose: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!(
            "Failed to create log directory {}",
            config.directory.display()
        )
    })?;

    let file_appender = rolling::daily(&config.directory, LOG_FILE_NAME);
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let mut filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("Invalid logging.level '{}'", config.level))?,
    };
    // hyper's connection pool is chatty at debug and below.
    if let Ok(hyper_directive) = "hyper_util=info".parse::<Directive>() {
        filter = filter.add_directive(hyper_directive);
    }

    let (text_layer, json_layer) = match config.format {
        LogFormat::Text => (
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(non_blocking_writer)
                    .with_file(true)
                    .with_line_number(true)
                    .with_thread_ids(true)
                    .with_target(false)
                    .with_timer(fmt::time::UtcTime::rfc_3339()),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                fmt::layer()
                    .json()
                    .with_writer(non_blocking_writer)
                    .with_file(true)
                    .with_line_number(true)
                    .with_thread_ids(true)
                    .with_target(false)
                    .with_timer(fmt::time::UtcTime::rfc_3339()),
            ),
        ),
    };

    let stderr_layer = verbose.then(|| {
        fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
    });

    let subscriber = Registry::default()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .with(stderr_layer)
        .with(ErrorLayer::default());

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global tracing subscriber")?;

    Ok(guard)
}

pub fn init_panic_handler() {
    panic::set_hook(Box::new(|panic_info| {
        let msg = match panic_info.payload().downcast_ref::<&str>() {
            Some(s) => (*s).to_string(),
            None => match panic_info.payload().downcast_ref::<String>() {
                Some(s) => s.clone(),
                None => "Unknown panic".to_string(),
            },
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());

        error!(
            message = %msg,
            location = %location,
            "ves-tail panicked!"
        );
        eprintln!("ves-tail panicked at {location}: {msg}");
    }));
}
