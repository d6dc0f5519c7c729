use std::io;

use tracing_appender::rolling;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Returned guard must be held for the lifetime of the process so the file
/// appender flushes on shutdown.
pub fn configure_logging() -> tracing_appender::non_blocking::WorkerGuard {
    // Stdout log configuration
    let stdout_log = fmt::layer().with_writer(io::stdout).with_filter(
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,web_request=info,db_query=info,sqlx=warn")),
    );

    // File log configuration
    let file_appender = rolling::daily("logs", "newsreel.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_log = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_filter(EnvFilter::new("debug,sqlx=info"));

    tracing_subscriber::Registry::default()
        .with(stdout_log)
        .with(file_log)
        .init();

    guard
}
