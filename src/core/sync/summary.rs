//! Sync run summary and reporting

use crate::core::queue::EnqueueReport;
use crate::core::submit::{Preview, SubmissionOutcome};
use crate::domain::{ExportType, RecordType, SourceName};
use std::time::Duration;

/// Why a run stopped
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunOutcome {
    /// Every candidate was checked
    #[default]
    Completed,
    /// The submission count budget ran out
    LimitReached,
    /// The wall-clock budget ran out
    TimeLimitReached,
    /// Shutdown was requested between batches
    Interrupted,
    /// The previous run's last submission has not landed; nothing was done
    GateAborted { reason: String },
}

/// Summary of one sync run
#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub record_type: RecordType,
    pub source: SourceName,
    pub outcome: RunOutcome,

    /// Candidates resolved from the criteria
    pub candidates: usize,

    /// Candidates compared against the mirror
    pub checked: usize,

    pub new_records: usize,
    pub updated_records: usize,
    pub deleted_records: usize,

    /// Candidates already matching the mirror
    pub converged: usize,

    /// Work-in-progress records left alone
    pub skipped: usize,

    /// Submissions answered with a non-2xx status or never completed
    pub rejected: usize,

    /// Candidates left unchecked when the run stopped early
    pub unprocessed: usize,

    /// Result of queueing the unprocessed remainder
    pub queued: Option<EnqueueReport>,

    /// Gate warnings and other non-fatal notices
    pub warnings: Vec<String>,

    /// Payloads held back by dry-run or XML output
    pub previews: Vec<Preview>,

    pub duration: Duration,
}

impl SyncSummary {
    pub fn new(record_type: RecordType, source: SourceName) -> Self {
        Self {
            record_type,
            source,
            outcome: RunOutcome::Completed,
            candidates: 0,
            checked: 0,
            new_records: 0,
            updated_records: 0,
            deleted_records: 0,
            converged: 0,
            skipped: 0,
            rejected: 0,
            unprocessed: 0,
            queued: None,
            warnings: Vec::new(),
            previews: Vec::new(),
            duration: Duration::from_secs(0),
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Counts one submission attempt
    pub fn record(&mut self, export_type: ExportType, outcome: SubmissionOutcome) {
        match export_type {
            ExportType::New => self.new_records += 1,
            ExportType::Update => self.updated_records += 1,
            ExportType::Delete => self.deleted_records += 1,
        }
        if !outcome.is_success() {
            self.rejected += 1;
        }
        if let SubmissionOutcome::Previewed(preview) = outcome {
            self.previews.push(preview);
        }
    }

    /// Submissions made (or previewed) this run
    pub fn submitted(&self) -> usize {
        self.new_records + self.updated_records + self.deleted_records
    }

    pub fn is_gate_abort(&self) -> bool {
        matches!(self.outcome, RunOutcome::GateAborted { .. })
    }

    /// No submission was rejected
    pub fn is_successful(&self) -> bool {
        self.rejected == 0
    }

    pub fn log_summary(&self) {
        if let RunOutcome::GateAborted { reason } = &self.outcome {
            tracing::info!(
                record_type = %self.record_type,
                source = %self.source,
                reason = %reason,
                "Sync skipped; try again later"
            );
            return;
        }

        tracing::info!(
            record_type = %self.record_type,
            source = %self.source,
            outcome = ?self.outcome,
            candidates = self.candidates,
            checked = self.checked,
            new = self.new_records,
            updated = self.updated_records,
            deleted = self.deleted_records,
            converged = self.converged,
            skipped = self.skipped,
            rejected = self.rejected,
            duration_secs = self.duration.as_secs(),
            "Sync completed"
        );

        if let Some(queued) = &self.queued {
            tracing::info!(
                added = queued.added,
                already_queued = queued.already_queued,
                "Unprocessed records queued"
            );
        } else if self.unprocessed > 0 {
            tracing::warn!(unprocessed = self.unprocessed, "Run stopped with unprocessed records");
        }

        for warning in &self.warnings {
            tracing::warn!(message = %warning, "Sync warning");
        }
    }
}
