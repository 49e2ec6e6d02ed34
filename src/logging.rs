//! Process-wide tracing setup: console plus a dated audit file.

use std::path::Path;

use chrono::{DateTime, Local};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Audit log file name for a given day, e.g. `17_10_2026audit.log`.
pub fn audit_file_name(at: DateTime<Local>) -> String {
    format!("{}audit.log", at.format("%d_%m_%Y"))
}

/// Append-only audit file in `log_dir`, created along with the directory.
pub fn audit_appender(log_dir: &Path) -> Result<RollingFileAppender, InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(audit_file_name(Local::now()))
        .build(log_dir)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Keep the guard alive until exit so the
/// file writer flushes.
///
/// Nothing is installed when the audit file cannot be opened; the caller can
/// still fall back to [`init_console`].
pub fn init(log_dir: &Path) -> Result<WorkerGuard, InitError> {
    let (file_writer, guard) = tracing_appender::non_blocking(audit_appender(log_dir)?);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    Ok(guard)
}

/// Console-only subscriber, for failures before the audit file exists.
pub fn init_console() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
