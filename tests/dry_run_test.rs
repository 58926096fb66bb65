//! Integration tests for dry-run and MARCXML preview runs
//!
//! Payloads are computed exactly as in a submitting run, but nothing reaches
//! the mirror, the export log or the queue.

mod common;

use common::{by_ids, title, Harness};
use dlsync::core::context::OutputMode;
use dlsync::core::sync::RunOutcome;
use dlsync::domain::{ExportType, Record, RecordType, SubmitMode};

fn harness(output: OutputMode) -> Harness {
    let mut h = Harness::new(RecordType::Bib);
    h.settings.output = output;
    h.store
        .insert_record(Record::new(RecordType::Bib, 1).with_field(title("Annual report")));
    h
}

#[tokio::test]
async fn test_dry_run_previews_without_side_effects() {
    let h = harness(OutputMode::DryRun);

    let summary = h.run(by_ids(&[1]), true).await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.new_records, 1);
    assert_eq!(summary.previews.len(), 1);

    let preview = &summary.previews[0];
    assert_eq!(preview.export_type, ExportType::New);
    assert_eq!(preview.mode, SubmitMode::InsertOrReplace);
    assert!(preview.xml.contains("Annual report"));
    assert!(preview.xml.contains("(DHL)1"));

    assert!(h.mirror.submissions().is_empty());
    assert!(h.store.log_entries().is_empty());
    assert!(h.store.queue_entries().is_empty());
}

#[tokio::test]
async fn test_dry_run_does_not_queue_remainder() {
    let mut h = harness(OutputMode::DryRun);
    h.settings.budgets.batch_size = 1;
    h.settings.budgets.limit = 1;
    h.store
        .insert_record(Record::new(RecordType::Bib, 2).with_field(title("Budget outline")));

    let summary = h.run(by_ids(&[1, 2]), true).await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::LimitReached);
    assert_eq!(summary.unprocessed, 1);
    assert!(summary.queued.is_none());
    assert!(h.store.queue_entries().is_empty());
}

#[tokio::test]
async fn test_xml_output_collects_payloads() {
    let h = harness(OutputMode::Xml);

    let summary = h.run(by_ids(&[1]), true).await.unwrap();

    assert_eq!(summary.previews.len(), 1);
    assert!(summary.previews[0].xml.contains("<record"));
    assert!(h.mirror.submissions().is_empty());
    assert!(h.store.log_entries().is_empty());
}

#[test]
fn test_output_mode_submits() {
    assert!(OutputMode::Submit.submits());
    assert!(!OutputMode::DryRun.submits());
    assert!(!OutputMode::Xml.submits());
}
