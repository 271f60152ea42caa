//! Logging setup driven by `[server]` settings.
//!
//! Production writes JSON to daily rolling files in the configured log
//! directory and compact lines to stdout for the journal. Development writes
//! pretty lines to stdout and reports request span timings.

use std::path::Path;

use anyhow::Context;
use beaconwatch_core::ServerSettings;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "beaconwatch";

/// Flushes buffered log writers when dropped. Keep it alive in `main`.
#[derive(Debug, Default)]
#[must_use = "dropping the guard stops background log writers"]
pub struct LoggingGuard {
    _writers: Vec<WorkerGuard>,
}

/// Build the filter: `RUST_LOG` when set, otherwise `settings.log_level`.
///
/// # Errors
///
/// Returns an error if the configured directive does not parse.
pub fn env_filter(settings: &ServerSettings) -> anyhow::Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .with_context(|| format!("invalid log level '{}'", settings.log_level))
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if the log level does not parse or the production log
/// directory cannot be created.
pub fn init(settings: &ServerSettings) -> anyhow::Result<LoggingGuard> {
    let filter = env_filter(settings)?;

    if settings.production {
        init_production(filter, &settings.resolved_log_directory())
    } else {
        init_development(filter);
        Ok(LoggingGuard::default())
    }
}

fn init_production(filter: EnvFilter, log_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;

    let (file_writer, file_guard) = tracing_appender::non_blocking(RollingFileAppender::new(
        Rotation::DAILY,
        log_dir,
        LOG_FILE_PREFIX,
    ));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_current_span(true)
                .with_thread_ids(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(stdout_writer)
                .with_ansi(false),
        )
        .init();

    Ok(LoggingGuard {
        _writers: vec![file_guard, stdout_guard],
    })
}

fn init_development(filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_from_settings() {
        let settings = ServerSettings {
            log_level: "beaconwatch_core=debug,info".into(),
            ..ServerSettings::default()
        };
        assert!(env_filter(&settings).is_ok());
    }

    #[test]
    fn test_production_without_writable_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let settings = ServerSettings {
            production: true,
            log_directory: Some(blocker.join("logs")),
            ..ServerSettings::default()
        };
        let err = init(&settings).unwrap_err();
        assert!(err.to_string().contains("creating log directory"));
    }
}
