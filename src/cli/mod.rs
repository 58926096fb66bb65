//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for dlsync using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// dlsync - catalog synchronization for the digital library mirror
#[derive(Parser, Debug)]
#[command(name = "dlsync")]
#[command(version, about, long_about = None)]
#[command(author = "dlsync Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "dlsync.toml", env = "DLSYNC_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "DLSYNC_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconcile the mirror with the source catalog
    Sync(commands::sync::SyncArgs),

    /// Check how long exports have been pending and raise alerts
    Alert(commands::alert::AlertArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Show export log and queue status
    Status(commands::status::StatusArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}
