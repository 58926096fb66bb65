//! Logging and observability
//!
//! Structured logging through `tracing`, with helper macros for the events
//! every run must leave behind: one per corrective decision, one per batch,
//! one per retry and one per submission.
//!
//! # Example
//!
//! ```no_run
//! use dlsync::logging::init_logging;
//! use dlsync::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!("Sync started");
//! ```

pub mod structured;

pub use structured::{init_logging, run_span, LoggingGuard};

/// Log a corrective decision taken for a record
///
/// # Example
///
/// ```no_run
/// use dlsync::log_decision;
///
/// log_decision!(1234567u64, "NEW");
/// log_decision!(1234567u64, "DUPLICATED FIELD", tag = "650");
/// ```
#[macro_export]
macro_rules! log_decision {
    ($record_id:expr, $decision:expr) => {
        tracing::info!(
            record_id = %$record_id,
            decision = $decision,
            "Sync decision"
        );
    };
    ($record_id:expr, $decision:expr, $($field:tt)+) => {
        tracing::info!(
            record_id = %$record_id,
            decision = $decision,
            $($field)+,
            "Sync decision"
        );
    };
}

/// Log a batch processing operation
///
/// # Example
///
/// ```no_run
/// use dlsync::log_batch_processing;
///
/// log_batch_processing!(100, 1000);
/// ```
#[macro_export]
macro_rules! log_batch_processing {
    ($current:expr, $total:expr) => {
        tracing::debug!(
            current = $current,
            total = $total,
            progress_pct = ($current as f64 / $total as f64 * 100.0),
            "Processing batch"
        );
    };
}

/// Log a retry attempt
///
/// # Example
///
/// ```no_run
/// use dlsync::log_retry_attempt;
///
/// log_retry_attempt!(2, 5, 10000u64, "API rate limit exceeded");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($attempt:expr, $max_attempts:expr, $delay_ms:expr, $reason:expr) => {
        tracing::warn!(
            attempt = $attempt,
            max_attempts = $max_attempts,
            delay_ms = $delay_ms,
            reason = %$reason,
            "Retrying operation"
        );
    };
}

/// Log the outcome of one submission from its export log entry
#[macro_export]
macro_rules! log_submission {
    ($entry:expr) => {
        if $entry.is_success() {
            tracing::info!(
                record_id = %$entry.record_id,
                record_type = %$entry.record_type,
                export_type = %$entry.export_type,
                export_id = %$entry.export_id,
                response_code = $entry.response_code,
                "Submission accepted"
            );
        } else {
            tracing::warn!(
                record_id = %$entry.record_id,
                record_type = %$entry.record_type,
                export_type = %$entry.export_type,
                export_id = %$entry.export_id,
                response_code = $entry.response_code,
                response_text = %$entry.response_text,
                "Submission rejected"
            );
        }
    };
}
