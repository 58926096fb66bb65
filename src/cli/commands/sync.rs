//! Sync command implementation
//!
//! This module implements the `sync` command, one reconciliation run for
//! one record type.

use super::exit_code;
use crate::adapters::database::create_stores;
use crate::adapters::mirror::HttpMirrorClient;
use crate::config::load_config;
use crate::core::clock::SystemClock;
use crate::core::context::{OutputMode, RunSettings, SyncContext};
use crate::core::criteria::CriteriaArgs;
use crate::core::submit::Preview;
use crate::core::sync::{RunOutcome, SyncCoordinator, SyncOptions, SyncSummary};
use crate::domain::{RecordId, RecordType};
use crate::logging::run_span;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::Args;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::Instrument;

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS` (UTC) or `YYYY-MM-DD`
fn parse_datetime(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("invalid date '{value}', expected YYYY-MM-DD or RFC 3339"))
}

/// Arguments for the sync command
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Record type to synchronize (bib or auth)
    #[arg(long = "type", value_name = "TYPE")]
    pub record_type: RecordType,

    /// Source identity written to the export log and queue
    #[arg(long)]
    pub source: Option<String>,

    /// A single record id
    #[arg(long)]
    pub id: Option<u64>,

    /// Comma-separated record ids
    #[arg(long, value_delimiter = ',')]
    pub ids: Vec<u64>,

    /// File with one record id per line
    #[arg(long, value_name = "PATH")]
    pub list: Option<PathBuf>,

    /// Records modified at or after this time
    #[arg(long, value_parser = parse_datetime)]
    pub modified_from: Option<DateTime<Utc>>,

    /// Upper bound for --modified-from
    #[arg(long, value_parser = parse_datetime)]
    pub modified_to: Option<DateTime<Utc>>,

    /// Records modified within this many seconds
    #[arg(long, value_name = "SECS")]
    pub modified_within: Option<u64>,

    /// Upper bound for --modified-within, in seconds before now
    #[arg(long, value_name = "SECS")]
    pub modified_until: Option<u64>,

    /// Records modified since the start of the last logged run
    #[arg(long)]
    pub modified_since_log: bool,

    /// JSON filter document
    #[arg(long)]
    pub query: Option<String>,

    /// Field query, e.g. `191__a:A/RES/1`
    #[arg(long)]
    pub querystring: Option<String>,

    /// Also take records queued by earlier runs. Records left over when a
    /// budget or shutdown stops the run are queued whether or not this is set
    #[arg(long)]
    pub queue: bool,

    /// Only process deletions (time window criteria only)
    #[arg(long)]
    pub delete_only: bool,

    /// Skip the completion gate
    #[arg(long)]
    pub force: bool,

    /// Maximum submissions, 0 = unlimited
    #[arg(long)]
    pub limit: Option<usize>,

    /// Time budget in seconds, 0 = unlimited
    #[arg(long, value_name = "SECS")]
    pub time_limit: Option<u64>,

    /// Compute corrections without submitting or logging them
    #[arg(long, conflicts_with = "xml")]
    pub dry_run: bool,

    /// Write payloads as MARCXML to PATH (or STDOUT) instead of submitting
    #[arg(long, value_name = "PATH")]
    pub xml: Option<String>,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

impl SyncArgs {
    fn criteria(&self) -> CriteriaArgs {
        CriteriaArgs {
            id: self.id.map(RecordId::new),
            ids: self.ids.iter().copied().map(RecordId::new).collect(),
            list: self.list.clone(),
            modified_from: self.modified_from,
            modified_to: self.modified_to,
            modified_within: self.modified_within,
            modified_until: self.modified_until,
            modified_since_log: self.modified_since_log,
            query: self.query.clone(),
            querystring: self.querystring.clone(),
            queue: self.queue,
            delete_only: self.delete_only,
        }
    }

    fn output_mode(&self) -> OutputMode {
        if self.xml.is_some() {
            OutputMode::Xml
        } else if self.dry_run {
            OutputMode::DryRun
        } else {
            OutputMode::Submit
        }
    }

    /// Execute the sync command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!(record_type = %self.record_type, "Starting sync command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };

        // Apply CLI overrides
        if let Some(source) = &self.source {
            tracing::info!(source = %source, "Overriding source from CLI");
            config.sync.source = source.clone();
        }
        if let Some(limit) = self.limit {
            config.sync.limit = limit;
        }
        if let Some(time_limit) = self.time_limit {
            config.sync.time_limit_secs = time_limit;
        }

        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(2);
        }

        let options = SyncOptions {
            criteria: self.criteria(),
            force: self.force,
        };
        if let Err(e) = options.criteria.criterion() {
            eprintln!("{e}");
            return Ok(exit_code(&e));
        }

        let mut settings = match RunSettings::from_config(&config, self.record_type) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("{e}");
                return Ok(exit_code(&e));
            }
        };
        if self.output_mode() != OutputMode::Submit {
            settings.output = self.output_mode();
        }

        if settings.output == OutputMode::DryRun {
            tracing::info!("Dry run mode enabled - nothing will be submitted");
            println!("DRY RUN MODE - nothing will be submitted or logged");
            println!();
        }

        // Confirmation prompt (unless --yes or nothing is submitted)
        if !self.yes && settings.output.submits() {
            println!("Sync Configuration:");
            println!("  Record type: {}", self.record_type);
            println!("  Source: {}", settings.source);
            println!("  Mirror: {}", config.mirror.base_url);
            println!("  Batch size: {}", settings.budgets.batch_size);
            println!("  Limit: {}", settings.budgets.limit);
            println!("  Force: {}", self.force);
            println!();
            print!("Proceed with sync? [y/N]: ");
            io::stdout().flush()?;

            let mut input = String::new();
            io::stdin().read_line(&mut input)?;

            if !input.trim().eq_ignore_ascii_case("y") {
                println!("Sync cancelled.");
                return Ok(0);
            }
        }

        let stores = match create_stores(&config.postgresql).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to connect to database");
                eprintln!("Failed to connect to database: {e}");
                return Ok(4);
            }
        };
        if let Err(e) = stores.admin.test_connection().await {
            eprintln!("Failed to connect to database: {e}");
            return Ok(4);
        }

        let mirror = match HttpMirrorClient::new(config.mirror.clone()) {
            Ok(m) => Arc::new(m),
            Err(e) => {
                tracing::error!(error = %e, "Failed to create mirror client");
                eprintln!("Failed to initialize mirror client: {e}");
                return Ok(4);
            }
        };

        let ctx = match SyncContext::load(stores, mirror, Arc::new(SystemClock), settings).await {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to initialize sync: {e}");
                return Ok(exit_code(&e));
            }
        };

        let span = run_span(ctx.record_type(), ctx.source(), ctx.export_start);
        let coordinator = SyncCoordinator::new(ctx, shutdown_signal);
        let summary = match coordinator.run(&options).instrument(span).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Sync failed");
                eprintln!("Sync failed: {e}");
                return Ok(exit_code(&e));
            }
        };

        if let Some(target) = &self.xml {
            write_previews(target, &summary.previews)?;
        } else if self.dry_run {
            print_previews(&summary.previews);
        }

        print_summary(&summary);
        Ok(summary_exit_code(&summary))
    }
}

/// Exit code of a run that finished without an error
fn summary_exit_code(summary: &SyncSummary) -> i32 {
    match summary.outcome {
        RunOutcome::Interrupted => 130,
        RunOutcome::GateAborted { .. } => 0,
        _ if !summary.is_successful() => 1,
        _ => 0,
    }
}

/// Wraps the payloads of a run in one MARCXML collection
fn previews_collection(previews: &[Preview]) -> String {
    let mut xml = String::from("<collection>");
    for preview in previews {
        xml.push_str(&preview.xml);
    }
    xml.push_str("</collection>");
    xml
}

fn write_previews(target: &str, previews: &[Preview]) -> anyhow::Result<()> {
    let xml = previews_collection(previews);
    if target.eq_ignore_ascii_case("stdout") {
        println!("{xml}");
    } else {
        std::fs::write(target, xml)?;
        println!("Wrote {} record(s) to {target}", previews.len());
    }
    Ok(())
}

fn print_previews(previews: &[Preview]) {
    for preview in previews {
        println!(
            "  would submit {} {} {} ({})",
            preview.export_type, preview.record_type, preview.record_id, preview.mode
        );
    }
    println!();
}

fn print_summary(summary: &SyncSummary) {
    if let RunOutcome::GateAborted { reason } = &summary.outcome {
        println!("Previous export has not landed yet; try again later.");
        println!("  Reason: {reason}");
        return;
    }

    println!();
    println!("Sync Summary:");
    println!("  Record type: {}", summary.record_type);
    println!("  Candidates: {}", summary.candidates);
    println!("  Checked: {}", summary.checked);
    println!("  New: {}", summary.new_records);
    println!("  Updated: {}", summary.updated_records);
    println!("  Deleted: {}", summary.deleted_records);
    println!("  Converged: {}", summary.converged);
    println!("  Skipped (work in progress): {}", summary.skipped);
    println!("  Rejected: {}", summary.rejected);
    println!("  Duration: {:.2}s", summary.duration.as_secs_f64());

    if let Some(queued) = &summary.queued {
        println!(
            "  Queued: {} added, {} already queued",
            queued.added, queued.already_queued
        );
    } else if summary.unprocessed > 0 {
        println!("  Unprocessed: {}", summary.unprocessed);
    }

    for warning in &summary.warnings {
        println!("  Warning: {warning}");
    }
    println!();

    match summary.outcome {
        RunOutcome::Interrupted => {
            println!("Sync interrupted gracefully. Unprocessed records were queued.")
        }
        RunOutcome::LimitReached => println!("Submission limit reached."),
        RunOutcome::TimeLimitReached => println!("Time limit reached."),
        _ if summary.is_successful() => println!("Sync completed successfully!"),
        _ => println!("Sync completed with rejected submissions"),
    }
}
