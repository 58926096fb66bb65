//! Status command implementation
//!
//! This module implements the `status` command for displaying the last
//! export and queue depth of each record type.

use crate::adapters::database::create_stores;
use crate::config::load_config;
use crate::domain::{ExportLogEntry, RecordType, SourceName};
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Source identity to report on (defaults to sync.source)
    #[arg(long)]
    pub source: Option<String>,

    /// Only report this record type
    #[arg(long = "type", value_name = "TYPE")]
    pub record_type: Option<RecordType>,
}

fn describe(entry: Option<&ExportLogEntry>) -> String {
    match entry {
        Some(e) => format!(
            "{} {} {} -> {} at {}",
            e.export_type,
            e.record_type,
            e.record_id,
            e.response_code,
            e.time.format("%Y-%m-%d %H:%M:%S")
        ),
        None => "Never".to_string(),
    }
}

impl StatusArgs {
    fn record_types(&self) -> Vec<RecordType> {
        match self.record_type {
            Some(rt) => vec![rt],
            None => vec![RecordType::Bib, RecordType::Auth],
        }
    }

    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking sync status");

        println!("Sync Status");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let source_name = self.source.clone().unwrap_or(config.sync.source.clone());
        let source = match SourceName::new(source_name) {
            Ok(s) => s,
            Err(e) => {
                println!("Invalid source: {e}");
                return Ok(2);
            }
        };

        let stores = match create_stores(&config.postgresql).await {
            Ok(s) => s,
            Err(e) => {
                println!("Failed to connect to database");
                println!("   Error: {e}");
                return Ok(4);
            }
        };

        println!("Source: {source}");
        println!();
        println!(
            "{:<6} {:<50} {:<50} {:<8}",
            "Type", "Last Export", "Last Successful", "Queued"
        );
        println!("{}", "-".repeat(116));

        for record_type in self.record_types() {
            let report = async {
                let last = stores.log.recent(&source, record_type, 1).await?;
                let success = stores.log.last_successful(Some(&source), record_type).await?;
                let queued = stores.queue.count(&source, record_type).await?;
                Ok::<_, crate::domain::SyncError>((last, success, queued))
            }
            .await;

            let (last, success, queued) = match report {
                Ok(r) => r,
                Err(e) => {
                    println!("Failed to read export state");
                    println!("   Error: {e}");
                    return Ok(5);
                }
            };

            println!(
                "{:<6} {:<50} {:<50} {:<8}",
                record_type.as_str(),
                describe(last.first()),
                describe(success.as_ref()),
                queued
            );
        }

        println!();
        Ok(0)
    }
}
