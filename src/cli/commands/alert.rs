//! Alert command implementation
//!
//! Runs one staleness check pass. Meant to be scheduled next to `sync`.

use super::exit_code;
use crate::adapters::database::create_stores;
use crate::adapters::notify::notifier_for;
use crate::config::load_config;
use crate::core::alert::{AlertThresholds, CollectionStatus, StalenessMonitor};
use crate::core::clock::SystemClock;
use crate::domain::SourceName;
use clap::Args;
use std::sync::Arc;

/// Arguments for the alert command
#[derive(Args, Debug)]
pub struct AlertArgs {
    /// Alert when exports have been pending longer than this many seconds
    #[arg(long, value_name = "SECS")]
    pub pending_time: Option<u64>,

    /// Minimum seconds between two alerts for one collection
    #[arg(long, value_name = "SECS")]
    pub alert_frequency: Option<u64>,
}

impl AlertArgs {
    /// Execute the alert command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking export staleness");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };

        if let Some(pending_time) = self.pending_time {
            config.alert.pending_time_secs = pending_time;
        }
        if let Some(frequency) = self.alert_frequency {
            config.alert.alert_frequency_secs = frequency;
        }
        if let Err(e) = config.validate() {
            eprintln!("Configuration validation failed: {e}");
            return Ok(2);
        }

        let source = match config.alert.source.clone().map(SourceName::new).transpose() {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Invalid alert.source: {e}");
                return Ok(2);
            }
        };

        let notifier = match notifier_for(config.alert.webhook_url.as_deref()) {
            Ok(n) => n,
            Err(e) => {
                eprintln!("Failed to create notifier: {e}");
                return Ok(exit_code(&e));
            }
        };

        let stores = match create_stores(&config.postgresql).await {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Failed to connect to database: {e}");
                return Ok(4);
            }
        };

        let monitor = StalenessMonitor::new(
            stores,
            notifier,
            Arc::new(SystemClock),
            AlertThresholds::from(&config.alert),
        )
        .with_source(source);

        let report = match monitor.check().await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "Staleness check failed");
                eprintln!("Staleness check failed: {e}");
                return Ok(exit_code(&e));
            }
        };

        for (collection, status) in &report.statuses {
            let line = match status {
                CollectionStatus::Quiet => "quiet".to_string(),
                CollectionStatus::Pending { pending_secs } => {
                    format!("pending {} min", pending_secs / 60)
                }
                CollectionStatus::Alerted { pending_secs } => {
                    format!("pending {} min, alert sent", pending_secs / 60)
                }
                CollectionStatus::Suppressed {
                    pending_secs,
                    last_alert,
                } => format!(
                    "pending {} min, last alert {}",
                    pending_secs / 60,
                    last_alert.format("%Y-%m-%d %H:%M:%S")
                ),
            };
            println!("  {collection}: {line}");
        }

        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_args_defaults() {
        let args = AlertArgs {
            pending_time: None,
            alert_frequency: None,
        };

        assert!(args.pending_time.is_none());
        assert!(args.alert_frequency.is_none());
    }
}
