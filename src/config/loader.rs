//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{MarkerTimezone, SyncConfig};
use super::secret::secret_string;
use crate::domain::errors::SyncError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into SyncConfig
/// 4. Applies environment variable overrides (DLSYNC_* prefix)
/// 5. Validates the configuration
///
/// # Examples
///
/// ```no_run
/// use dlsync::config::loader::load_config;
///
/// let config = load_config("dlsync.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<SyncConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(SyncError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        SyncError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let contents = substitute_env_vars(&contents)?;

    let mut config: SyncConfig = toml::from_str(&contents)
        .map_err(|e| SyncError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        SyncError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are left untouched.
///
/// # Errors
///
/// Returns an error if a referenced environment variable is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| SyncError::Configuration(format!("Invalid substitution pattern: {e}")))?;
    let mut result = String::new();
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{}}}", var_name);
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(SyncError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

/// Applies environment variable overrides using DLSYNC_* prefix
///
/// Environment variables follow the pattern: DLSYNC_<SECTION>_<KEY>
/// For example: DLSYNC_MIRROR_BASE_URL, DLSYNC_SYNC_LIMIT
fn apply_env_overrides(config: &mut SyncConfig) -> Result<()> {
    // Application overrides
    if let Ok(val) = std::env::var("DLSYNC_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Ok(val) = std::env::var("DLSYNC_APPLICATION_DRY_RUN") {
        config.application.dry_run = val.parse().unwrap_or(false);
    }

    // Mirror overrides
    if let Ok(val) = std::env::var("DLSYNC_MIRROR_BASE_URL") {
        config.mirror.base_url = val;
    }
    if let Ok(val) = std::env::var("DLSYNC_MIRROR_API_KEY") {
        config.mirror.api_key = secret_string(val);
    }
    if let Ok(val) = std::env::var("DLSYNC_MIRROR_CALLBACK_URL") {
        config.mirror.callback_url = Some(val);
    }
    if let Ok(val) = std::env::var("DLSYNC_MIRROR_NONCE_KEY") {
        config.mirror.nonce_key = Some(secret_string(val));
    }
    if let Ok(val) = std::env::var("DLSYNC_MIRROR_MARKER_TIMEZONE") {
        config.mirror.marker_timezone = match val.as_str() {
            "utc" => MarkerTimezone::Utc,
            "us_eastern" => MarkerTimezone::UsEastern,
            other => {
                return Err(SyncError::Configuration(format!(
                    "Invalid DLSYNC_MIRROR_MARKER_TIMEZONE '{other}'. Must be 'us_eastern' or 'utc'"
                )))
            }
        };
    }

    // Database overrides
    if let Ok(val) = std::env::var("DLSYNC_POSTGRESQL_CONNECTION_STRING") {
        config.postgresql.connection_string = secret_string(val);
    }
    if let Ok(val) = std::env::var("DLSYNC_POSTGRESQL_MAX_CONNECTIONS") {
        if let Ok(max) = val.parse() {
            config.postgresql.max_connections = max;
        }
    }

    // Sync overrides
    if let Ok(val) = std::env::var("DLSYNC_SYNC_SOURCE") {
        config.sync.source = val;
    }
    if let Ok(val) = std::env::var("DLSYNC_SYNC_BATCH_SIZE") {
        if let Ok(size) = val.parse() {
            config.sync.batch_size = size;
        }
    }
    if let Ok(val) = std::env::var("DLSYNC_SYNC_LIMIT") {
        if let Ok(limit) = val.parse() {
            config.sync.limit = limit;
        }
    }
    if let Ok(val) = std::env::var("DLSYNC_SYNC_TIME_LIMIT_SECS") {
        if let Ok(secs) = val.parse() {
            config.sync.time_limit_secs = secs;
        }
    }

    // Alert overrides
    if let Ok(val) = std::env::var("DLSYNC_ALERT_WEBHOOK_URL") {
        config.alert.webhook_url = Some(val);
    }
    if let Ok(val) = std::env::var("DLSYNC_ALERT_PENDING_TIME_SECS") {
        if let Ok(secs) = val.parse() {
            config.alert.pending_time_secs = secs;
        }
    }

    // Logging overrides
    if let Ok(val) = std::env::var("DLSYNC_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = val.parse().unwrap_or(true);
    }
    if let Ok(val) = std::env::var("DLSYNC_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}
