//! Completion gate
//!
//! A run only starts once the last submission of the previous run for the
//! same source and record type is visible in the mirror. This is what keeps
//! two runs from racing corrections against a mirror that has not caught up.

use crate::config::{MarkerTimezone, TieBreak};
use crate::core::context::SyncContext;
use crate::domain::{ExportLogEntry, ExportType, MarcFields, MirrorRecord, Result, SyncError};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday};

/// Outcome of the gate check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    /// Proceed even though the last export has not landed
    ProceedWithWarning(String),
    /// The last export has not landed yet; try again later
    Abort { reason: String },
}

impl GateDecision {
    pub fn is_abort(&self) -> bool {
        matches!(self, GateDecision::Abort { .. })
    }
}

/// Parses the mirror's 005 marker (`YYYYMMDDHHMMSS[.f]`) into UTC
pub fn parse_marker(marker: &str, timezone: MarkerTimezone) -> Option<DateTime<Utc>> {
    let whole = marker.trim().split('.').next()?;
    let local = NaiveDateTime::parse_from_str(whole, "%Y%m%d%H%M%S").ok()?;

    let utc = match timezone {
        MarkerTimezone::Utc => local,
        MarkerTimezone::UsEastern => {
            let offset = if is_us_eastern_dst(local) { 4 } else { 5 };
            local + Duration::hours(offset)
        }
    };
    Some(Utc.from_utc_datetime(&utc))
}

/// Daylight saving in US Eastern local time: second Sunday of March 02:00
/// until first Sunday of November 02:00
fn is_us_eastern_dst(local: NaiveDateTime) -> bool {
    let year = local.year();
    let start = NaiveDate::from_weekday_of_month_opt(year, 3, Weekday::Sun, 2)
        .and_then(|d| d.and_hms_opt(2, 0, 0));
    let end = NaiveDate::from_weekday_of_month_opt(year, 11, Weekday::Sun, 1)
        .and_then(|d| d.and_hms_opt(2, 0, 0));

    match (start, end) {
        (Some(start), Some(end)) => local >= start && local < end,
        _ => false,
    }
}

/// Checks whether the previous run's last submission has landed
pub struct CompletionGate<'a> {
    ctx: &'a SyncContext,
}

impl<'a> CompletionGate<'a> {
    pub fn new(ctx: &'a SyncContext) -> Self {
        Self { ctx }
    }

    /// Runs the check
    ///
    /// # Errors
    ///
    /// Fails when there is no log history at all, when every examined entry
    /// was rejected, or when an updated record has vanished from the mirror.
    pub async fn check(&self) -> Result<GateDecision> {
        let ctx = self.ctx;
        let lookback = ctx.settings.gate.log_lookback;
        let recent = ctx
            .stores
            .log
            .recent(ctx.source(), ctx.record_type(), lookback)
            .await?;

        let Some(newest) = recent.first() else {
            return Err(SyncError::State(
                "No log data found for this source. Run with --force to skip this check"
                    .to_string(),
            ));
        };

        let Some(last_success) = recent.iter().find(|e| e.is_success()) else {
            return Err(SyncError::State(format!(
                "The last {} exports have been rejected by the mirror. Check data and API status",
                recent.len()
            )));
        };

        let last_exported = match self.newer_new_record(newest, last_success, &recent).await? {
            Some(entry) => entry,
            None => last_success.clone(),
        };

        let grace = ctx
            .settings
            .gate
            .grace_window_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds);
        if let Some(grace) = grace {
            let age = ctx.clock.now() - last_exported.time;
            if age > grace {
                return Ok(GateDecision::ProceedWithWarning(format!(
                    "Last export ({} {}) is older than the {}s grace window",
                    last_exported.record_type,
                    last_exported.record_id,
                    grace.num_seconds()
                )));
            }
        }

        let mirror_copy = ctx
            .search_mirror(&[last_exported.record_id])
            .await?
            .into_iter()
            .find(|r| r.id == Some(last_exported.record_id));

        let Some(pending) = self.pending_kind(&last_exported, mirror_copy.as_ref())? else {
            tracing::debug!(
                record_id = %last_exported.record_id,
                export_id = %last_exported.export_id,
                "Last export has landed"
            );
            return Ok(GateDecision::Proceed);
        };

        let callback = ctx
            .stores
            .callbacks
            .latest_for_export(
                last_exported.record_type,
                last_exported.record_id,
                last_exported.export_id,
            )
            .await?;

        if callback.is_some_and(|c| !c.success) {
            let message = format!(
                "Last export ({pending}) of {} {} failed to import; proceeding",
                last_exported.record_type, last_exported.record_id
            );
            tracing::warn!("{message}");
            return Ok(GateDecision::ProceedWithWarning(message));
        }

        Ok(GateDecision::Abort {
            reason: format!(
                "Last export not cleared in the mirror yet ({pending}) ({} {} @ {})",
                last_exported.record_type,
                last_exported.record_id,
                last_exported.time.to_rfc3339()
            ),
        })
    }

    /// NEW submission more recent than the last successful export, which is
    /// checked in its place
    async fn newer_new_record(
        &self,
        newest: &ExportLogEntry,
        last_success: &ExportLogEntry,
        recent: &[ExportLogEntry],
    ) -> Result<Option<ExportLogEntry>> {
        let ctx = self.ctx;
        match ctx.settings.gate.new_record_tie_break {
            TieBreak::SameRun => Ok(ctx
                .stores
                .log
                .latest_in_run(
                    ctx.source(),
                    ctx.record_type(),
                    newest.export_start,
                    ExportType::New,
                )
                .await?
                .filter(|e| e.time > last_success.time)),
            TieBreak::NewerOnly => Ok(recent
                .iter()
                .filter(|e| e.export_type == ExportType::New && e.time > last_success.time)
                .max_by_key(|e| e.time)
                .cloned()),
        }
    }

    /// Which kind of export is still pending, if any
    fn pending_kind(
        &self,
        exported: &ExportLogEntry,
        mirror: Option<&MirrorRecord>,
    ) -> Result<Option<ExportType>> {
        if exported.export_type == ExportType::Delete {
            let landed = mirror.map_or(true, |m| m.is_tombstone());
            return Ok((!landed).then_some(ExportType::Delete));
        }

        match mirror {
            Some(record) => {
                let modified = record
                    .marker()
                    .and_then(|m| parse_marker(m, self.ctx.settings.marker_timezone));
                let landed = modified.is_some_and(|m| m >= exported.time);
                Ok((!landed).then_some(exported.export_type))
            }
            None if exported.export_type == ExportType::New => Ok(Some(ExportType::New)),
            None => Err(SyncError::Consistency(format!(
                "Last updated record not found by the mirror search API: {} {}",
                exported.record_type, exported.record_id
            ))),
        }
    }
}
