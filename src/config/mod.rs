//! Configuration management for dlsync.
//!
//! TOML configuration with `${VAR_NAME}` substitution, `DLSYNC_*` environment
//! overrides, defaults for every optional setting, and validation on load.
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [mirror]
//! base_url = "https://digitallibrary.un.org/api/v1"
//! api_key = "${DLSYNC_MIRROR_API_KEY}"
//! callback_url = "https://sync.example.org/callback"
//!
//! [postgresql]
//! connection_string = "${DLSYNC_DATABASE_URL}"
//!
//! [sync]
//! source = "dlsync-scheduled"
//! limit = 1000
//! time_limit_secs = 600
//!
//! [alert]
//! webhook_url = "https://hooks.example.org/dlsync"
//! ```
//!
//! ```rust,no_run
//! use dlsync::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("dlsync.toml")?;
//! println!("Mirror: {}", config.mirror.base_url);
//! # Ok(())
//! # }
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::load_config;
pub use schema::{
    AlertConfig, ApplicationConfig, GateConfig, LoggingConfig, MarkerTimezone, MirrorConfig,
    PostgreSQLConfig, RetryConfig, SyncConfig, SyncSettings, TieBreak,
};
pub use secret::{secret_string, secret_string_opt, SecretString, SecretValue};
