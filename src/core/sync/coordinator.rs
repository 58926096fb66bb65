//! Sync coordinator - drives one run for one record type
//!
//! Order of work: validate criteria, pass the completion gate, resolve
//! candidates, then walk them in fixed-size batches. Inside a batch,
//! deletions are settled first, then missing records, then field diffs.
//! Budgets and shutdown requests are honored at batch boundaries only.

use crate::core::context::SyncContext;
use crate::core::criteria::{CriteriaArgs, CriteriaResolver};
use crate::core::differ::{BatchDiffer, DiffOutcome};
use crate::core::gate::{CompletionGate, GateDecision};
use crate::core::queue::QueueManager;
use crate::core::submit::SubmissionGateway;
use crate::core::sync::summary::{RunOutcome, SyncSummary};
use crate::domain::{
    ExportType, MarcFields, MirrorRecord, Record, RecordId, Result, SubmitMode, SyncError,
};
use crate::{log_batch_processing, log_decision};
use std::collections::{HashMap, HashSet};
use tokio::sync::watch;

/// Options of one run
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub criteria: CriteriaArgs,
    /// Skip the completion gate
    pub force: bool,
}

pub struct SyncCoordinator {
    ctx: SyncContext,
    queue: QueueManager,
    shutdown: watch::Receiver<bool>,
}

impl SyncCoordinator {
    pub fn new(ctx: SyncContext, shutdown: watch::Receiver<bool>) -> Self {
        let queue = QueueManager::new(
            ctx.stores.queue.clone(),
            ctx.source().clone(),
            ctx.record_type(),
        );
        Self {
            ctx,
            queue,
            shutdown,
        }
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Executes the run
    ///
    /// A gate abort is reported through [`RunOutcome::GateAborted`], not as
    /// an error.
    ///
    /// # Errors
    ///
    /// Invalid criteria, gate failures (no history, all rejected, a vanished
    /// record), exhausted search retries, mismatched search results and
    /// store failures abort the run.
    pub async fn run(&self, options: &SyncOptions) -> Result<SyncSummary> {
        let ctx = &self.ctx;
        let mut summary = SyncSummary::new(ctx.record_type(), ctx.source().clone());

        options.criteria.criterion()?;

        tracing::info!(
            record_type = %ctx.record_type(),
            source = %ctx.source(),
            export_start = %ctx.export_start,
            output = ?ctx.settings.output,
            "Starting sync"
        );

        if options.force {
            tracing::warn!("Completion gate skipped (--force)");
        } else {
            match CompletionGate::new(ctx).check().await? {
                GateDecision::Proceed => {}
                GateDecision::ProceedWithWarning(message) => summary.warnings.push(message),
                GateDecision::Abort { reason } => {
                    summary.outcome = RunOutcome::GateAborted { reason };
                    let summary = summary.with_duration(ctx.elapsed());
                    summary.log_summary();
                    return Ok(summary);
                }
            }
        }

        let candidates = CriteriaResolver::new(ctx, &self.queue)
            .resolve(&options.criteria)
            .await?;
        summary.candidates = candidates.len();

        let mut seen = HashSet::new();
        let sequence: Vec<Record> = candidates
            .into_sequence()
            .into_iter()
            .filter(|r| seen.insert(r.id))
            .collect();

        let budgets = ctx.settings.budgets;
        let batch_size = budgets.batch_size.max(1);
        let total = sequence.len();
        let mut processed = 0;

        for batch in sequence.chunks(batch_size) {
            if self.shutdown_requested() {
                tracing::warn!("Shutdown requested, stopping before next batch");
                summary.outcome = RunOutcome::Interrupted;
                break;
            }

            log_batch_processing!(processed + batch.len(), total);
            self.process_batch(batch, &mut summary).await?;
            processed += batch.len();

            if budgets.limit_reached(summary.submitted()) {
                tracing::info!(limit = budgets.limit, "Reached max exports");
                summary.outcome = RunOutcome::LimitReached;
                break;
            }
            if budgets.time_exhausted(ctx.elapsed()) {
                tracing::info!("Time limit exceeded");
                summary.outcome = RunOutcome::TimeLimitReached;
                break;
            }
        }

        let remainder: Vec<RecordId> = sequence[processed..].iter().map(|r| r.id).collect();
        summary.unprocessed = remainder.len();
        if !remainder.is_empty() && ctx.settings.output.submits() {
            summary.queued = Some(self.queue.enqueue(&remainder, ctx.clock.now()).await?);
        }

        let summary = summary.with_duration(ctx.elapsed());
        summary.log_summary();
        Ok(summary)
    }

    /// Matches search results back to the batch
    fn align(batch: &[Record], found: Vec<MirrorRecord>) -> Result<HashMap<RecordId, MirrorRecord>> {
        let wanted: HashSet<RecordId> = batch.iter().map(|r| r.id).collect();
        let mut copies = HashMap::new();

        for copy in found {
            let Some(id) = copy.id else {
                return Err(SyncError::Consistency(
                    "Search returned a mirror record without a control number".to_string(),
                ));
            };
            if !wanted.contains(&id) {
                return Err(SyncError::Consistency(format!(
                    "Mirror record {id} does not match any candidate in the batch"
                )));
            }
            copies.entry(id).or_insert(copy);
        }
        Ok(copies)
    }

    async fn process_batch(&self, batch: &[Record], summary: &mut SyncSummary) -> Result<()> {
        let ctx = &self.ctx;
        let ids: Vec<RecordId> = batch.iter().map(|r| r.id).collect();
        let mut copies = Self::align(batch, ctx.search_mirror(&ids).await?)?;

        let gateway = SubmissionGateway::new(ctx, &self.queue);
        let differ = BatchDiffer::new(ctx);
        let mut done = Vec::with_capacity(batch.len());

        for record in batch.iter().filter(|r| r.is_tombstone()) {
            summary.checked += 1;
            match copies.remove(&record.id) {
                Some(copy) if !copy.is_tombstone() => {
                    log_decision!(record.id, "DELETE");
                    self.submit_whole(&gateway, record, ExportType::Delete, summary)
                        .await?;
                }
                _ => summary.converged += 1,
            }
            done.push(record.id);
        }

        let live: Vec<&Record> = batch.iter().filter(|r| !r.is_tombstone()).collect();

        for record in live.iter().filter(|r| !copies.contains_key(&r.id)) {
            summary.checked += 1;
            if record.is_work_in_progress() {
                summary.skipped += 1;
            } else {
                log_decision!(record.id, "NEW");
                self.submit_whole(&gateway, record, ExportType::New, summary)
                    .await?;
            }
            done.push(record.id);
        }

        for record in &live {
            let Some(copy) = copies.get(&record.id) else {
                continue;
            };
            summary.checked += 1;
            done.push(record.id);

            if record.is_work_in_progress() {
                summary.skipped += 1;
                continue;
            }

            match differ.diff(record, copy).await? {
                DiffOutcome::Converged => summary.converged += 1,
                DiffOutcome::Correction(correction) => {
                    let outcome = gateway
                        .submit(&correction, SubmitMode::Correct, ExportType::Update)
                        .await?;
                    summary.record(ExportType::Update, outcome);
                }
                DiffOutcome::WholeUpdate { .. } => {
                    self.submit_whole(&gateway, record, ExportType::Update, summary)
                        .await?;
                }
            }
        }

        if ctx.settings.output.submits() {
            self.queue.complete(&done).await?;
        }
        Ok(())
    }

    /// Transforms and submits the full record
    async fn submit_whole(
        &self,
        gateway: &SubmissionGateway<'_>,
        record: &Record,
        export_type: ExportType,
        summary: &mut SyncSummary,
    ) -> Result<()> {
        let prepared = self.ctx.transform.prepare(record).await?;
        let outcome = gateway
            .submit(&prepared, SubmitMode::InsertOrReplace, export_type)
            .await?;
        summary.record(export_type, outcome);
        Ok(())
    }
}
