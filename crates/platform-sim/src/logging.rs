//! provides logging helpers

use std::path::Path;

use anyhow::Context;
use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

fn env_filter() -> filter::EnvFilter {
    filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .from_env_lossy()
}

/// initiate the global tracing subscriber
///
/// Logs go to stderr and, when `log_file` is set, also to a daily rolling
/// file next to it. The returned guard flushes the file writer on drop.
pub fn init(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let stderr_layer = layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter());

    let Some(log_file) = log_file else {
        registry().with(stderr_layer).init();
        return Ok(None);
    };

    let directory = log_file
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let prefix = log_file
        .file_name()
        .and_then(|name| name.to_str())
        .context("log file path has no file name")?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .max_log_files(3)
        .build(directory)
        .context("failed to create rolling file appender")?;
    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);

    let file_layer = layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_filter(env_filter());

    registry().with(stderr_layer).with(file_layer).init();
    Ok(Some(file_guard))
}
