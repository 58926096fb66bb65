//! Integration tests for logging functionality

use dlsync::config::LoggingConfig;
use dlsync::logging::init_logging;
use tempfile::TempDir;

#[test]
fn test_logging_config_default() {
    let config = LoggingConfig::default();
    assert!(config.local_enabled);
    assert_eq!(config.local_path, "/var/log/dlsync");
    assert_eq!(config.local_rotation, "daily");
    assert_eq!(config.local_max_size_mb, 100);
}

#[test]
fn test_invalid_log_level_is_rejected() {
    let config = LoggingConfig {
        local_enabled: false,
        ..Default::default()
    };

    let result = init_logging("verbose", &config);
    assert!(result.is_err());
    if let Err(e) = result {
        assert!(e.to_string().contains("Invalid log level"));
    }
}

// Installs the global subscriber; keep it the only test here that succeeds in doing so
#[test]
fn test_file_logging_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("logs");

    let config = LoggingConfig {
        local_enabled: true,
        local_path: log_path.to_string_lossy().to_string(),
        local_rotation: "never".to_string(),
        local_max_size_mb: 10,
    };

    assert!(!log_path.exists());
    let guard = init_logging("debug", &config).unwrap();
    tracing::info!(record_id = 42, "Sync decision");
    drop(guard);

    assert!(log_path.exists());
    assert!(log_path.join("dlsync.log").exists());
}
