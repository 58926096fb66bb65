//! Shared fixtures for integration tests
//!
//! Wires an in-memory source store, an in-memory mirror and a manual clock
//! into a [`SyncCoordinator`].

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use dlsync::adapters::database::{InMemoryStore, Stores};
use dlsync::adapters::mirror::{InMemoryMirror, RetryPolicy};
use dlsync::config::{GateConfig, MarkerTimezone, RetryConfig};
use dlsync::core::clock::ManualClock;
use dlsync::core::context::{Budgets, OutputMode, RunSettings, SyncContext};
use dlsync::core::criteria::CriteriaArgs;
use dlsync::core::sync::{SyncCoordinator, SyncOptions, SyncSummary};
use dlsync::domain::{Field, RecordId, RecordType, Result, SourceName, Subfield};
use std::sync::Arc;
use tokio::sync::watch;

pub const MIRROR_FILE_HOST: &str = "digitallibrary.un.org";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn title(value: &str) -> Field {
    Field::data("245", ' ', ' ', vec![Subfield::new('a', value)])
}

pub fn subject(value: &str) -> Field {
    Field::data("650", ' ', '7', vec![Subfield::new('a', value)])
}

pub fn ids(values: &[u64]) -> Vec<RecordId> {
    values.iter().copied().map(RecordId::new).collect()
}

pub fn by_ids(values: &[u64]) -> CriteriaArgs {
    CriteriaArgs {
        ids: ids(values),
        ..Default::default()
    }
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub mirror: Arc<InMemoryMirror>,
    pub clock: Arc<ManualClock>,
    pub settings: RunSettings,
}

impl Harness {
    pub fn new(record_type: RecordType) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        let mirror = Arc::new(InMemoryMirror::new(clock.clone(), MIRROR_FILE_HOST));

        let settings = RunSettings {
            record_type,
            source: SourceName::new("dlsync").unwrap(),
            budgets: Budgets {
                batch_size: 100,
                limit: 0,
                time_limit: None,
            },
            max_list_ids: 5000,
            max_file_symbols: 1000,
            file_host_whitelist: vec!["dag.un.org".to_string()],
            mirror_file_host: MIRROR_FILE_HOST.to_string(),
            retry: RetryPolicy::from(&RetryConfig::default()),
            gate: GateConfig::default(),
            marker_timezone: MarkerTimezone::Utc,
            output: OutputMode::Submit,
            nonce_key: None,
        };

        Self {
            store: Arc::new(InMemoryStore::new()),
            mirror,
            clock,
            settings,
        }
    }

    pub async fn coordinator(&self, shutdown: watch::Receiver<bool>) -> Result<SyncCoordinator> {
        let ctx = SyncContext::load(
            Stores::in_memory(self.store.clone()),
            self.mirror.clone(),
            self.clock.clone(),
            self.settings.clone(),
        )
        .await?;
        Ok(SyncCoordinator::new(ctx, shutdown))
    }

    /// Runs once, one minute after the previous run
    pub async fn run(&self, criteria: CriteriaArgs, force: bool) -> Result<SyncSummary> {
        self.clock.advance(std::time::Duration::from_secs(60));
        let (_tx, rx) = watch::channel(false);
        let coordinator = self.coordinator(rx).await?;
        coordinator.run(&SyncOptions { criteria, force }).await
    }
}
