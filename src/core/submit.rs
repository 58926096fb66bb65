//! Submission gateway
//!
//! One POST per call, never retried. Every attempt that reaches the wire is
//! appended to the export log whatever the answer, so the next run's
//! completion gate can see rejections. Dry runs and XML output stop short of
//! the POST and leave no trace in the log.

use crate::adapters::mirror::{to_marcxml, SubmissionRequest};
use crate::core::context::SyncContext;
use crate::core::queue::QueueManager;
use crate::domain::{
    ExportId, ExportLogEntry, ExportType, Nonce, Record, RecordId, RecordType, Result, SubmitMode,
    SyncError,
};
use crate::log_submission;
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};

/// Hex encoded SHA-256 of a payload
///
/// # Examples
///
/// ```
/// use dlsync::core::submit::payload_checksum;
///
/// assert_eq!(payload_checksum("<record/>").len(), 64);
/// ```
pub fn payload_checksum(xml: &str) -> String {
    format!("{:x}", Sha256::digest(xml.as_bytes()))
}

/// Rejects mode and export type pairs the mirror cannot apply
///
/// Only an UPDATE may be sent as a partial correction.
pub fn validate_mode(mode: SubmitMode, export_type: ExportType) -> Result<()> {
    match (mode, export_type) {
        (SubmitMode::Correct, ExportType::New) | (SubmitMode::Correct, ExportType::Delete) => {
            Err(SyncError::Validation(format!(
                "{export_type} exports cannot be submitted in '{mode}' mode"
            )))
        }
        _ => Ok(()),
    }
}

/// Payload computed but not submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub record_type: RecordType,
    pub record_id: RecordId,
    pub export_type: ExportType,
    pub mode: SubmitMode,
    pub xml: String,
}

/// What happened to one payload
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    /// POSTed and logged
    Submitted(ExportLogEntry),
    /// Held back by dry-run or XML output
    Previewed(Preview),
}

impl SubmissionOutcome {
    /// Whether the mirror accepted the payload; previews count as accepted
    pub fn is_success(&self) -> bool {
        match self {
            SubmissionOutcome::Submitted(entry) => entry.is_success(),
            SubmissionOutcome::Previewed(_) => true,
        }
    }
}

pub struct SubmissionGateway<'a> {
    ctx: &'a SyncContext,
    queue: &'a QueueManager,
}

impl<'a> SubmissionGateway<'a> {
    pub fn new(ctx: &'a SyncContext, queue: &'a QueueManager) -> Self {
        Self { ctx, queue }
    }

    fn nonce(&self, record: &Record, export_id: ExportId) -> Result<String> {
        let nonce = Nonce {
            record_type: record.record_type,
            id: record.id,
            export_id,
            key: self
                .ctx
                .settings
                .nonce_key
                .as_ref()
                .map(|key| key.expose_secret().as_ref().to_string()),
        };
        Ok(serde_json::to_string(&nonce)?)
    }

    /// Serializes and submits a prepared record
    ///
    /// # Errors
    ///
    /// Fails on an invalid mode for `export_type`, on serialization errors
    /// and when the log entry cannot be written. A non-2xx answer or a
    /// transport failure is not an error: it is logged and returned.
    pub async fn submit(
        &self,
        record: &Record,
        mode: SubmitMode,
        export_type: ExportType,
    ) -> Result<SubmissionOutcome> {
        validate_mode(mode, export_type)?;

        let xml = to_marcxml(&record.fields, RecordType::Auth.control_prefix())?;

        if !self.ctx.settings.output.submits() {
            tracing::debug!(
                record_id = %record.id,
                export_type = %export_type,
                mode = %mode,
                "Payload held back from submission"
            );
            return Ok(SubmissionOutcome::Previewed(Preview {
                record_type: record.record_type,
                record_id: record.id,
                export_type,
                mode,
                xml,
            }));
        }

        let export_id = ExportId::generate();
        let request = SubmissionRequest {
            mode,
            xml,
            nonce: self.nonce(record, export_id)?,
        };

        let time = self.ctx.clock.now();
        let (response_code, response_text) = match self.ctx.mirror.submit(&request).await {
            Ok(response) => (response.status, response.body),
            Err(e) => {
                tracing::error!(record_id = %record.id, error = %e, "Submission did not complete");
                (0, e.to_string())
            }
        };

        let entry = ExportLogEntry {
            export_start: self.ctx.export_start,
            export_id,
            export_type,
            time,
            source: self.ctx.source().clone(),
            record_type: record.record_type,
            record_id: record.id,
            response_code,
            response_text: response_text.replace(['\r', '\n'], ""),
            checksum: payload_checksum(&request.xml),
            xml: request.xml,
        };

        self.ctx.stores.log.append(&entry).await?;
        log_submission!(entry);

        if entry.is_success() {
            self.queue.complete(&[record.id]).await?;
        }

        Ok(SubmissionOutcome::Submitted(entry))
    }
}
