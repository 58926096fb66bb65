//! Staleness monitor
//!
//! Watches how long source edits have been waiting for a successful export
//! and raises a notification when the wait passes a threshold. Alerts are
//! rate limited per collection through the alert state store.

use crate::adapters::database::Stores;
use crate::adapters::notify::Notifier;
use crate::config::AlertConfig;
use crate::core::clock::Clock;
use crate::domain::{AlertState, Collection, Result, SourceName};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Thresholds of one check pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertThresholds {
    /// Pending time that triggers an alert
    pub pending_secs: i64,
    /// Cooldown between alerts for one collection
    pub frequency_secs: i64,
    /// Collections untouched for longer than this are quiet
    pub inactivity_secs: i64,
}

impl From<&AlertConfig> for AlertThresholds {
    fn from(config: &AlertConfig) -> Self {
        Self {
            pending_secs: secs(config.pending_time_secs),
            frequency_secs: secs(config.alert_frequency_secs),
            inactivity_secs: secs(config.inactivity_secs),
        }
    }
}

fn secs(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// What the monitor concluded for one collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionStatus {
    /// No edits recently, nothing to watch
    Quiet,
    /// Edits are pending, but not for long enough to alert
    Pending { pending_secs: i64 },
    /// An alert was sent and recorded
    Alerted { pending_secs: i64 },
    /// Over the threshold, but an alert went out within the cooldown
    Suppressed { pending_secs: i64, last_alert: DateTime<Utc> },
}

#[derive(Debug, Clone, Default)]
pub struct AlertReport {
    pub statuses: Vec<(Collection, CollectionStatus)>,
}

impl AlertReport {
    pub fn alerts_sent(&self) -> usize {
        self.statuses
            .iter()
            .filter(|(_, status)| matches!(status, CollectionStatus::Alerted { .. }))
            .count()
    }

    pub fn status(&self, collection: Collection) -> Option<&CollectionStatus> {
        self.statuses
            .iter()
            .find(|(c, _)| *c == collection)
            .map(|(_, status)| status)
    }
}

/// Alert message for one collection
pub fn alert_message(collection: Collection, pending_secs: i64) -> String {
    format!(
        "{} exports have been pending for more than {} minutes",
        collection.label(),
        pending_secs / 60
    )
}

pub struct StalenessMonitor {
    stores: Stores,
    notifier: Box<dyn Notifier>,
    clock: Arc<dyn Clock>,
    thresholds: AlertThresholds,
    source: Option<SourceName>,
}

impl StalenessMonitor {
    pub fn new(
        stores: Stores,
        notifier: Box<dyn Notifier>,
        clock: Arc<dyn Clock>,
        thresholds: AlertThresholds,
    ) -> Self {
        Self {
            stores,
            notifier,
            clock,
            thresholds,
            source: None,
        }
    }

    /// Only count exports logged by `source`
    pub fn with_source(mut self, source: Option<SourceName>) -> Self {
        self.source = source;
        self
    }

    /// Runs one pass over every collection
    ///
    /// # Errors
    ///
    /// Store failures and notification delivery failures abort the pass.
    /// A failed delivery leaves no alert state behind, so the next pass
    /// tries again.
    pub async fn check(&self) -> Result<AlertReport> {
        let mut report = AlertReport::default();
        for collection in Collection::ALL {
            let status = self.check_collection(collection).await?;
            tracing::debug!(collection = %collection, status = ?status, "Staleness checked");
            report.statuses.push((collection, status));
        }
        Ok(report)
    }

    /// Seconds the oldest uncovered edit has been waiting, if any
    async fn pending_secs(&self, collection: Collection, now: DateTime<Utc>) -> Result<Option<i64>> {
        let record_type = collection.record_type();

        let Some(latest) = self.stores.records.latest_update(record_type).await? else {
            return Ok(None);
        };
        if (now - latest).num_seconds() > self.thresholds.inactivity_secs {
            return Ok(None);
        }

        let covered_until = self
            .stores
            .log
            .last_successful(self.source.as_ref(), record_type)
            .await?
            .map_or(DateTime::<Utc>::MIN_UTC, |entry| entry.time);

        let oldest = self
            .stores
            .records
            .earliest_updated_after(record_type, covered_until)
            .await?;

        Ok(oldest.map(|since| (now - since).num_seconds().max(0)))
    }

    async fn check_collection(&self, collection: Collection) -> Result<CollectionStatus> {
        let now = self.clock.now();

        let Some(pending_secs) = self.pending_secs(collection, now).await? else {
            return Ok(CollectionStatus::Quiet);
        };
        if pending_secs <= self.thresholds.pending_secs {
            return Ok(CollectionStatus::Pending { pending_secs });
        }

        if let Some(last) = self.stores.alerts.latest(collection).await? {
            if now - last.time < Duration::seconds(self.thresholds.frequency_secs) {
                tracing::info!(
                    collection = %collection,
                    last_alert = %last.time,
                    pending_secs = pending_secs,
                    "Alert suppressed by cooldown"
                );
                return Ok(CollectionStatus::Suppressed {
                    pending_secs,
                    last_alert: last.time,
                });
            }
        }

        let message = alert_message(collection, pending_secs);
        tracing::warn!(collection = %collection, pending_secs = pending_secs, "{message}");

        self.notifier
            .notify("Warning: exports are out of sync", &message)
            .await?;

        self.stores
            .alerts
            .record(&AlertState {
                collection,
                time: now,
                pending_secs,
            })
            .await?;

        Ok(CollectionStatus::Alerted { pending_secs })
    }
}
