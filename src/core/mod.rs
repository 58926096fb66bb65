//! Core reconciliation logic
//!
//! # Modules
//!
//! - [`criteria`] - Selects candidate records and pending deletions
//! - [`gate`] - Decides whether the previous run's last submission has landed
//! - [`transform`] - Prepares source records for submission
//! - [`differ`] - Field-level comparison against the mirror copy
//! - [`submit`] - Posts payloads and appends the export log
//! - [`queue`] - Backlog of records a run could not get to
//! - [`sync`] - Batch loop tying the pieces together
//! - [`alert`] - Staleness monitoring
//!
//! # Sync Workflow
//!
//! 1. **Gate**: Refuse to start while the last submission is still in flight
//! 2. **Resolve**: Turn the selection criterion into candidates and tombstones
//! 3. **Search**: Fetch mirror copies one batch at a time
//! 4. **Diff**: Delete, create or correct each record as needed
//! 5. **Queue**: Park whatever the budgets did not leave time for
//!
//! # Example
//!
//! ```rust,no_run
//! use dlsync::adapters::database::create_stores;
//! use dlsync::adapters::mirror::HttpMirrorClient;
//! use dlsync::config::load_config;
//! use dlsync::core::clock::SystemClock;
//! use dlsync::core::context::{RunSettings, SyncContext};
//! use dlsync::core::sync::{SyncCoordinator, SyncOptions};
//! use dlsync::domain::RecordType;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("dlsync.toml")?;
//! let stores = create_stores(&config.postgresql).await?;
//! let mirror = Arc::new(HttpMirrorClient::new(config.mirror.clone())?);
//! let settings = RunSettings::from_config(&config, RecordType::Bib)?;
//! let ctx = SyncContext::load(stores, mirror, Arc::new(SystemClock), settings).await?;
//!
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let coordinator = SyncCoordinator::new(ctx, shutdown_rx);
//!
//! let summary = coordinator.run(&SyncOptions::default()).await?;
//! println!("Updated: {}", summary.updated_records);
//! # Ok(())
//! # }
//! ```

pub mod alert;
pub mod clock;
pub mod context;
pub mod criteria;
pub mod differ;
pub mod gate;
pub mod queue;
pub mod submit;
pub mod sync;
pub mod transform;
