//! Subscriber setup and run-scoped spans
//!
//! Console output is always on. With `local_enabled`, events are also written
//! as JSON lines to `<local_path>/dlsync.log`, rotated per `local_rotation`.

use crate::config::LoggingConfig;
use crate::domain::{RecordType, Result, SourceName, SyncError};
use chrono::{DateTime, Utc};
use tracing::{Level, Span};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "dlsync";
const LOG_FILE_SUFFIX: &str = "log";

/// Keeps the file writer flushing; hold it until the process exits
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the logging system based on configuration
///
/// `RUST_LOG` takes precedence over `log_level_str` when set.
///
/// # Example
///
/// ```no_run
/// use dlsync::logging::init_logging;
/// use dlsync::config::LoggingConfig;
///
/// let config = LoggingConfig::default();
/// let _guard = init_logging("info", &config).expect("Failed to initialize logging");
/// ```
///
/// # Errors
///
/// An unknown level, an unusable log directory, or a second initialization
/// in the same process.
pub fn init_logging(log_level_str: &str, config: &LoggingConfig) -> Result<LoggingGuard> {
    let log_level = parse_log_level(log_level_str)?;
    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("dlsync={log_level}")))
    };

    let mut layers = vec![tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(filter())
        .boxed()];

    let file_guard = if config.local_enabled {
        let appender = file_appender(config)?;
        let (writer, guard) = tracing_appender::non_blocking(appender);

        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(writer)
                .with_filter(filter())
                .boxed(),
        );
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| SyncError::Configuration(format!("Logging already initialized: {e}")))?;

    tracing::info!(
        local_enabled = config.local_enabled,
        local_path = %config.local_path,
        rotation = %config.local_rotation,
        "Logging initialized"
    );

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

fn file_appender(config: &LoggingConfig) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(&config.local_path).map_err(|e| {
        SyncError::Configuration(format!(
            "Failed to create log directory {}: {e}",
            config.local_path
        ))
    })?;

    RollingFileAppender::builder()
        .rotation(parse_rotation(&config.local_rotation))
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .build(&config.local_path)
        .map_err(|e| {
            SyncError::Configuration(format!(
                "Failed to open log file in {}: {e}",
                config.local_path
            ))
        })
}

/// Span wrapping one sync run; every event inside carries the run identity
pub fn run_span(record_type: RecordType, source: &SourceName, export_start: DateTime<Utc>) -> Span {
    tracing::info_span!(
        "sync_run",
        record_type = %record_type,
        source = %source,
        export_start = %export_start.to_rfc3339(),
    )
}

fn parse_rotation(rotation: &str) -> Rotation {
    match rotation {
        "hourly" => Rotation::HOURLY,
        "never" => Rotation::NEVER,
        _ => Rotation::DAILY,
    }
}

fn parse_log_level(level_str: &str) -> Result<Level> {
    match level_str.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(SyncError::Configuration(format!(
            "Invalid log level: {level_str}. Must be one of: trace, debug, info, warn, error"
        ))),
    }
}
