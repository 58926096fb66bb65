//! External system integrations for dlsync.
//!
//! This module provides adapters for the systems the sync engine talks to:
//!
//! - [`mirror`] - remote catalog search and record submission (HTTP)
//! - [`database`] - store abstraction layer (trait-based)
//! - [`postgresql`] - PostgreSQL implementation of the stores
//! - [`notify`] - alert delivery
//!
//! # Design Pattern
//!
//! Adapters follow the **Adapter Pattern** to isolate external dependencies and
//! enable testing with in-memory implementations. Both the store layer and the
//! mirror client sit behind traits.
//!
//! # Mirror Adapter
//!
//! ```rust,no_run
//! use dlsync::adapters::mirror::{HttpMirrorClient, MirrorClient};
//! use dlsync::config::{secret_string, MarkerTimezone, MirrorConfig, RetryConfig};
//! use dlsync::domain::RecordType;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MirrorConfig {
//!     base_url: "https://digitallibrary.un.org/api/v1".to_string(),
//!     api_key: secret_string("token".to_string()),
//!     callback_url: Some("https://sync.example.org/callback".to_string()),
//!     nonce_key: None,
//!     timeout_seconds: 60,
//!     marker_timezone: MarkerTimezone::UsEastern,
//!     file_host_whitelist: vec!["dag.un.org".to_string()],
//!     mirror_file_host: "digitallibrary.un.org".to_string(),
//!     retry: RetryConfig::default(),
//! };
//!
//! let client = HttpMirrorClient::new(config)?;
//! let xml = client.search(RecordType::Bib, "035__a:(DHL)1").await?;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod mirror;
pub mod notify;
pub mod postgresql;
