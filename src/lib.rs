// dlsync - catalog synchronization for the digital library mirror
// Copyright (c) 2025 dlsync Contributors
// Licensed under the MIT License

//! # dlsync - catalog synchronization
//!
//! dlsync keeps a remote bibliographic catalog (the mirror) consistent with
//! the source catalog it is fed from. Each run selects candidate records,
//! compares them field by field with their mirror copies and submits only
//! what differs.
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Reconciliation logic (criteria, gate, transform, diff, submission, queue, alerts)
//! - [`adapters`] - External integrations (PostgreSQL stores, mirror API, notifications)
//! - [`domain`] - MARC records, export log types and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Safety net between runs
//!
//! A run refuses to start while the previous run's last submission has not
//! shown up in the mirror (see [`core::gate`]). Work a run could not finish
//! within its budgets is parked in a durable queue and resumed with
//! `--queue`.
//!
//! ## Error Handling
//!
//! Library code returns [`domain::Result`] with [`domain::SyncError`]; the
//! CLI maps errors onto process exit codes.
//!
//! ```rust,no_run
//! use dlsync::domain::SyncError;
//!
//! fn example() -> Result<(), SyncError> {
//!     let config = dlsync::config::load_config("dlsync.toml")?;
//!     println!("Syncing as {}", config.sync.source);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
