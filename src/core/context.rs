//! Per-run context shared by every stage of a sync run

use crate::adapters::database::Stores;
use crate::adapters::mirror::{MirrorClient, MirrorRecordReader, RetryPolicy};
use crate::config::{GateConfig, MarkerTimezone, SecretString, SyncConfig};
use crate::core::clock::Clock;
use crate::core::transform::TransformPipeline;
use crate::domain::{MirrorRecord, RecordId, RecordType, Result, SourceName, SyncError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// What happens to computed payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// POST to the mirror and log the outcome
    #[default]
    Submit,
    /// Compute payloads and report them without submitting or logging
    DryRun,
    /// Collect payloads for MARCXML output instead of submitting
    Xml,
}

impl OutputMode {
    pub fn submits(&self) -> bool {
        matches!(self, OutputMode::Submit)
    }
}

/// Count and time budgets of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budgets {
    pub batch_size: usize,
    /// Submissions allowed per run, 0 = unlimited
    pub limit: usize,
    pub time_limit: Option<Duration>,
}

impl Budgets {
    pub fn limit_reached(&self, submitted: usize) -> bool {
        self.limit != 0 && submitted >= self.limit
    }

    pub fn time_exhausted(&self, elapsed: Duration) -> bool {
        self.time_limit.is_some_and(|limit| elapsed >= limit)
    }
}

/// Settings of one run, resolved from configuration and command line overrides
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub record_type: RecordType,
    pub source: SourceName,
    pub budgets: Budgets,
    /// Most ids accepted from an id list file
    pub max_list_ids: usize,
    /// Most attachment-changed symbols a time window may pull in
    pub max_file_symbols: usize,
    pub file_host_whitelist: Vec<String>,
    pub mirror_file_host: String,
    pub retry: RetryPolicy,
    pub gate: GateConfig,
    pub marker_timezone: MarkerTimezone,
    pub output: OutputMode,
    pub nonce_key: Option<SecretString>,
}

impl RunSettings {
    pub fn from_config(config: &SyncConfig, record_type: RecordType) -> Result<Self> {
        let source =
            SourceName::new(config.sync.source.clone()).map_err(SyncError::Configuration)?;
        let time_limit = match config.sync.time_limit_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            record_type,
            source,
            budgets: Budgets {
                batch_size: config.sync.batch_size,
                limit: config.sync.limit,
                time_limit,
            },
            max_list_ids: config.sync.max_list_ids,
            max_file_symbols: config.sync.max_file_symbols,
            file_host_whitelist: config.mirror.file_host_whitelist.clone(),
            mirror_file_host: config.mirror.mirror_file_host.clone(),
            retry: RetryPolicy::from(&config.mirror.retry),
            gate: config.gate.clone(),
            marker_timezone: config.mirror.marker_timezone,
            output: if config.application.dry_run {
                OutputMode::DryRun
            } else {
                OutputMode::Submit
            },
            nonce_key: config.mirror.nonce_key.clone(),
        })
    }
}

/// Everything a run needs, passed by reference through the pipeline
///
/// The blacklist is snapshotted once when the context is loaded.
#[derive(Clone)]
pub struct SyncContext {
    pub stores: Stores,
    pub mirror: Arc<dyn MirrorClient>,
    pub clock: Arc<dyn Clock>,
    pub settings: RunSettings,
    pub export_start: DateTime<Utc>,
    pub transform: TransformPipeline,
}

impl SyncContext {
    /// Builds the context, reading the symbol blacklist from the source store
    pub async fn load(
        stores: Stores,
        mirror: Arc<dyn MirrorClient>,
        clock: Arc<dyn Clock>,
        settings: RunSettings,
    ) -> Result<Self> {
        let blacklist = stores.records.blacklisted_symbols().await?;
        tracing::debug!(blacklisted = blacklist.len(), "Loaded symbol blacklist");

        let transform = TransformPipeline::new(
            stores.files.clone(),
            settings.file_host_whitelist.clone(),
            blacklist,
        );

        Ok(Self {
            export_start: clock.now(),
            stores,
            mirror,
            clock,
            settings,
            transform,
        })
    }

    pub fn record_type(&self) -> RecordType {
        self.settings.record_type
    }

    pub fn source(&self) -> &SourceName {
        &self.settings.source
    }

    /// Wall-clock time since the run started
    pub fn elapsed(&self) -> Duration {
        (self.clock.now() - self.export_start)
            .to_std()
            .unwrap_or_default()
    }

    /// Search query matching the mirror copies of `ids`
    pub fn search_query(&self, ids: impl IntoIterator<Item = RecordId>) -> String {
        let prefix = self.record_type().control_prefix();
        ids.into_iter()
            .map(|id| format!("035__a:{prefix}{id}"))
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    /// Fetches the mirror copies of `ids`, retrying transient failures
    pub async fn search_mirror(&self, ids: &[RecordId]) -> Result<Vec<MirrorRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = self.search_query(ids.iter().copied());
        let record_type = self.record_type();
        let mirror = self.mirror.as_ref();

        let xml = self
            .settings
            .retry
            .run(self.clock.as_ref(), || mirror.search(record_type, &query))
            .await?;

        MirrorRecordReader::new(&xml).collect()
    }
}
