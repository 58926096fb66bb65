//! Integration tests for end-to-end sync runs
//!
//! These tests verify that:
//! - A converged catalog produces no submissions
//! - Corrections carry only the fields that differ
//! - Missing records are submitted whole, deletions are propagated once
//! - Unprocessed candidates survive in the queue for the next run
//! - A run waits for the previous run's last submission to land
//! - Files the mirror lacks or holds at the wrong size force a whole update

mod common;

use chrono::{DateTime, Duration, Utc};
use common::{by_ids, start_time, subject, title, Harness};
use dlsync::adapters::database::{ExportLog, QueueStore};
use dlsync::core::criteria::CriteriaArgs;
use dlsync::core::sync::RunOutcome;
use dlsync::domain::{
    CallbackEntry, ExportId, ExportLogEntry, ExportType, Field, Language, MarcFields, QueueEntry,
    Record, RecordId, RecordType, SourceName, StoredFile, SubmitMode, Subfield, SyncError,
};

fn bib(id: u64, heading: &str) -> Record {
    Record::new(RecordType::Bib, id)
        .with_updated(start_time() - Duration::hours(1))
        .with_field(title(heading))
        .with_field(subject("HUMAN RIGHTS"))
}

fn mirror_copy(id: u64, heading: &str) -> Vec<Field> {
    vec![
        Field::control("001", (5000 + id).to_string()),
        Field::control("005", "20240101000000.0"),
        Field::data("035", ' ', ' ', vec![Subfield::new('a', format!("(DHL){id}"))]),
        title(heading),
        subject("HUMAN RIGHTS"),
        Field::data("980", ' ', ' ', vec![Subfield::new('a', "BIB")]),
    ]
}

fn marked(mut copy: Vec<Field>, marker: &str) -> Vec<Field> {
    copy[1] = Field::control("005", marker);
    copy
}

fn symbol(value: &str) -> Field {
    Field::data("191", ' ', ' ', vec![Subfield::new('a', value)])
}

fn stored(uri: &str, size: u64, languages: Vec<Language>) -> StoredFile {
    StoredFile {
        uri: uri.to_string(),
        filename: uri.rsplit('/').next().unwrap_or_default().to_string(),
        size,
        languages,
        timestamp: start_time() - Duration::days(1),
    }
}

fn hosted(id: u64, name: &str, size: u64) -> Field {
    Field::data(
        "856",
        '4',
        '2',
        vec![
            Subfield::new(
                'u',
                format!("https://{}/record/{}/files/{name}", common::MIRROR_FILE_HOST, 5000 + id),
            ),
            Subfield::new('s', size.to_string()),
        ],
    )
}

fn queued(id: u64) -> QueueEntry {
    QueueEntry {
        time: start_time(),
        source: SourceName::new("dlsync").unwrap(),
        record_type: RecordType::Bib,
        record_id: RecordId::new(id),
    }
}

fn logged(
    export_type: ExportType,
    id: u64,
    export_start: DateTime<Utc>,
    time: DateTime<Utc>,
) -> ExportLogEntry {
    ExportLogEntry {
        export_start,
        export_id: ExportId::generate(),
        export_type,
        time,
        source: SourceName::new("dlsync").unwrap(),
        record_type: RecordType::Bib,
        record_id: RecordId::new(id),
        response_code: 200,
        response_text: String::new(),
        xml: String::new(),
        checksum: String::new(),
    }
}

#[tokio::test]
async fn test_new_record_is_submitted_whole() {
    let h = Harness::new(RecordType::Bib);
    h.store.insert_record(bib(1, "Annual report"));

    let summary = h.run(by_ids(&[1]), true).await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.new_records, 1);
    assert_eq!(summary.submitted(), 1);

    let submissions = h.mirror.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].mode, SubmitMode::InsertOrReplace);
    assert!(submissions[0].xml.contains("(DHL)1"));

    let copy = h.mirror.get(RecordType::Bib, RecordId::new(1)).unwrap();
    assert_eq!(copy.get_value("245", 'a'), Some("Annual report"));
    assert_eq!(copy.get_value("980", 'a'), Some("BIB"));

    let log = h.store.log_entries();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].export_type, ExportType::New);
    assert!(log[0].is_success());
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let h = Harness::new(RecordType::Bib);
    h.store.insert_record(bib(1, "Annual report"));
    h.store.insert_record(bib(2, "Budget outline"));

    let first = h.run(by_ids(&[1, 2]), true).await.unwrap();
    assert_eq!(first.new_records, 2);

    // Gate passes: the last submission is visible with a fresh marker
    let second = h.run(by_ids(&[1, 2]), false).await.unwrap();

    assert_eq!(second.outcome, RunOutcome::Completed);
    assert_eq!(second.submitted(), 0);
    assert_eq!(second.converged, 2);
    assert_eq!(h.mirror.submissions().len(), 2);
}

#[tokio::test]
async fn test_correction_carries_only_changed_fields() {
    let h = Harness::new(RecordType::Bib);
    h.store.insert_record(bib(3, "New title"));
    h.mirror
        .insert(RecordType::Bib, RecordId::new(3), mirror_copy(3, "Old title"));

    let summary = h.run(by_ids(&[3]), true).await.unwrap();

    assert_eq!(summary.updated_records, 1);
    let submissions = h.mirror.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].mode, SubmitMode::Correct);
    assert!(submissions[0].xml.contains("New title"));
    assert!(!submissions[0].xml.contains("HUMAN RIGHTS"));

    let copy = h.mirror.get(RecordType::Bib, RecordId::new(3)).unwrap();
    assert_eq!(copy.get_value("245", 'a'), Some("New title"));
    assert_eq!(copy.get_value("650", 'a'), Some("HUMAN RIGHTS"));

    let again = h.run(by_ids(&[3]), false).await.unwrap();
    assert_eq!(again.submitted(), 0);
    assert_eq!(again.converged, 1);
}

#[tokio::test]
async fn test_missing_status_triggers_whole_update() {
    let h = Harness::new(RecordType::Bib);
    h.store.insert_record(bib(4, "Annual report"));
    let mut copy = mirror_copy(4, "Annual report");
    copy.retain(|f| f.tag != "980");
    h.mirror.insert(RecordType::Bib, RecordId::new(4), copy);

    let summary = h.run(by_ids(&[4]), true).await.unwrap();

    assert_eq!(summary.updated_records, 1);
    assert_eq!(h.mirror.submissions()[0].mode, SubmitMode::InsertOrReplace);
    let copy = h.mirror.get(RecordType::Bib, RecordId::new(4)).unwrap();
    assert_eq!(copy.get_value("980", 'a'), Some("BIB"));
    assert_eq!(copy.control_value("001"), Some("5004"));
}

#[tokio::test]
async fn test_deletion_converges() {
    let h = Harness::new(RecordType::Bib);
    h.mirror
        .insert(RecordType::Bib, RecordId::new(2), mirror_copy(2, "Withdrawn"));
    h.store
        .delete_record(RecordType::Bib, RecordId::new(2), start_time() - Duration::minutes(30));

    let window = CriteriaArgs {
        modified_within: Some(7200),
        ..Default::default()
    };

    let first = h.run(window.clone(), true).await.unwrap();
    assert_eq!(first.deleted_records, 1);
    assert!(h
        .mirror
        .get(RecordType::Bib, RecordId::new(2))
        .unwrap()
        .is_tombstone());

    let second = h.run(window, false).await.unwrap();
    assert_eq!(second.submitted(), 0);
    assert_eq!(second.converged, 1);
    assert_eq!(h.mirror.submissions().len(), 1);
}

#[tokio::test]
async fn test_work_in_progress_is_skipped() {
    let h = Harness::new(RecordType::Bib);
    h.store.insert_record(bib(6, "Work in progress: draft"));

    let summary = h.run(by_ids(&[6]), true).await.unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.submitted(), 0);
    assert!(h.mirror.submissions().is_empty());
}

#[tokio::test]
async fn test_limit_queues_remainder_for_next_run() {
    let mut h = Harness::new(RecordType::Bib);
    h.settings.budgets.batch_size = 1;
    h.settings.budgets.limit = 1;
    h.store.insert_record(bib(1, "Older").with_updated(start_time() - Duration::hours(2)));
    h.store.insert_record(bib(2, "Newer").with_updated(start_time() - Duration::hours(1)));

    let first = h.run(by_ids(&[1, 2]), true).await.unwrap();

    assert_eq!(first.outcome, RunOutcome::LimitReached);
    assert_eq!(first.submitted(), 1);
    assert_eq!(first.unprocessed, 1);
    assert!(h.mirror.get(RecordType::Bib, RecordId::new(2)).is_some());
    let queued: Vec<RecordId> = h.store.queue_entries().iter().map(|e| e.record_id).collect();
    assert_eq!(queued, vec![RecordId::new(1)]);

    let from_queue = CriteriaArgs {
        queue: true,
        ..Default::default()
    };
    let second = h.run(from_queue, false).await.unwrap();

    assert_eq!(second.new_records, 1);
    assert!(h.mirror.get(RecordType::Bib, RecordId::new(1)).is_some());
    assert!(h.store.queue_entries().is_empty());
}

#[tokio::test]
async fn test_gate_blocks_until_last_export_lands() {
    let h = Harness::new(RecordType::Bib);
    h.store.insert_record(bib(1, "Annual report"));
    h.mirror.set_apply(false);

    h.run(by_ids(&[1]), true).await.unwrap();
    let second = h.run(by_ids(&[1]), false).await.unwrap();

    assert!(matches!(second.outcome, RunOutcome::GateAborted { .. }));
    assert!(second.is_gate_abort());
    assert_eq!(second.checked, 0);
    assert_eq!(h.mirror.submissions().len(), 1);
}

#[tokio::test]
async fn test_gate_proceeds_after_failed_import_callback() {
    let h = Harness::new(RecordType::Bib);
    h.store.insert_record(bib(1, "Annual report"));
    h.mirror.set_apply(false);
    h.run(by_ids(&[1]), true).await.unwrap();

    h.store.add_callback(CallbackEntry {
        time: start_time(),
        record_type: RecordType::Bib,
        record_id: RecordId::new(1),
        export_id: Some(h.store.log_entries()[0].export_id),
        success: false,
        message: Some("Import failed".to_string()),
    });

    h.mirror.set_apply(true);
    let second = h.run(by_ids(&[1]), false).await.unwrap();

    assert_eq!(second.outcome, RunOutcome::Completed);
    assert_eq!(second.warnings.len(), 1);
    assert_eq!(second.new_records, 1);
}

#[tokio::test]
async fn test_gate_without_history_requires_force() {
    let h = Harness::new(RecordType::Bib);
    h.store.insert_record(bib(1, "Annual report"));

    let err = h.run(by_ids(&[1]), false).await.unwrap_err();

    assert!(matches!(err, SyncError::State(_)));
    assert!(h.mirror.submissions().is_empty());
}

#[tokio::test]
async fn test_rejected_submission_is_logged_and_kept_out_of_mirror() {
    let h = Harness::new(RecordType::Bib);
    h.store.insert_record(bib(1, "Annual report"));
    h.mirror.reject_with(400, "Bad record\r\n");

    let summary = h.run(by_ids(&[1]), true).await.unwrap();

    assert_eq!(summary.rejected, 1);
    assert!(!summary.is_successful());
    assert!(h.mirror.get(RecordType::Bib, RecordId::new(1)).is_none());

    let log = h.store.log_entries();
    assert_eq!(log[0].response_code, 400);
    assert_eq!(log[0].response_text, "Bad record");
}

#[tokio::test]
async fn test_conflicting_criteria_do_nothing() {
    let h = Harness::new(RecordType::Bib);
    let criteria = CriteriaArgs {
        id: Some(RecordId::new(1)),
        modified_within: Some(60),
        ..Default::default()
    };

    let err = h.run(criteria, true).await.unwrap_err();

    assert!(matches!(err, SyncError::AmbiguousCriteria(_)));
    assert!(h.store.log_entries().is_empty());
}

#[tokio::test]
async fn test_gate_ignores_failed_callback_of_another_export() {
    let h = Harness::new(RecordType::Bib);
    h.store.insert_record(bib(1, "Annual report"));
    h.mirror.set_apply(false);
    h.run(by_ids(&[1]), true).await.unwrap();

    h.store.add_callback(CallbackEntry {
        time: start_time(),
        record_type: RecordType::Bib,
        record_id: RecordId::new(1),
        export_id: Some(ExportId::generate()),
        success: false,
        message: Some("Import failed".to_string()),
    });

    let second = h.run(by_ids(&[1]), false).await.unwrap();

    assert!(matches!(second.outcome, RunOutcome::GateAborted { .. }));
    assert_eq!(h.mirror.submissions().len(), 1);
}

#[tokio::test]
async fn test_queued_deletion_is_resumed() {
    let mut h = Harness::new(RecordType::Bib);
    h.settings.budgets.batch_size = 1;
    h.settings.budgets.limit = 1;
    h.store.insert_record(bib(1, "Annual report"));
    h.mirror
        .insert(RecordType::Bib, RecordId::new(2), mirror_copy(2, "Withdrawn"));
    h.store
        .delete_record(RecordType::Bib, RecordId::new(2), start_time() - Duration::minutes(30));

    let window = CriteriaArgs {
        modified_within: Some(7200),
        ..Default::default()
    };
    let first = h.run(window, true).await.unwrap();

    assert_eq!(first.outcome, RunOutcome::LimitReached);
    assert_eq!(first.new_records, 1);
    let queued: Vec<RecordId> = h.store.queue_entries().iter().map(|e| e.record_id).collect();
    assert_eq!(queued, vec![RecordId::new(2)]);

    h.settings.budgets.limit = 0;
    let from_queue = CriteriaArgs {
        queue: true,
        ..Default::default()
    };
    let second = h.run(from_queue, false).await.unwrap();

    assert_eq!(second.outcome, RunOutcome::Completed);
    assert_eq!(second.deleted_records, 1);
    assert!(h.store.queue_entries().is_empty());
    assert!(h
        .mirror
        .get(RecordType::Bib, RecordId::new(2))
        .unwrap()
        .is_tombstone());
}

#[tokio::test]
async fn test_queued_id_without_trace_is_dropped() {
    let h = Harness::new(RecordType::Bib);
    h.store.insert_record(bib(1, "Annual report"));
    h.store
        .enqueue(&[queued(1), queued(77)])
        .await
        .unwrap();

    let from_queue = CriteriaArgs {
        queue: true,
        ..Default::default()
    };
    let summary = h.run(from_queue, true).await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.new_records, 1);
    assert_eq!(summary.deleted_records, 0);
    assert!(h.store.queue_entries().is_empty());
}

#[tokio::test]
async fn test_gate_checks_update_written_after_new_in_same_run() {
    let h = Harness::new(RecordType::Bib);
    let run_start = start_time() - Duration::hours(1);
    h.mirror.insert(
        RecordType::Bib,
        RecordId::new(1),
        marked(mirror_copy(1, "Landed"), "20240301110500.0"),
    );
    h.mirror.insert(
        RecordType::Bib,
        RecordId::new(2),
        marked(mirror_copy(2, "Pending"), "20240301110500.0"),
    );
    h.store
        .append(&logged(ExportType::New, 1, run_start, start_time() - Duration::minutes(60)))
        .await
        .unwrap();
    h.store
        .append(&logged(ExportType::Update, 2, run_start, start_time() - Duration::minutes(30)))
        .await
        .unwrap();

    let summary = h.run(by_ids(&[9]), false).await.unwrap();

    assert!(matches!(summary.outcome, RunOutcome::GateAborted { .. }));
}

#[tokio::test]
async fn test_gate_checks_new_written_after_update_in_same_run() {
    let h = Harness::new(RecordType::Bib);
    let run_start = start_time() - Duration::hours(1);
    h.mirror.insert(
        RecordType::Bib,
        RecordId::new(1),
        marked(mirror_copy(1, "Landed"), "20240301113500.0"),
    );
    h.mirror.insert(
        RecordType::Bib,
        RecordId::new(2),
        marked(mirror_copy(2, "Landed"), "20240301110500.0"),
    );
    h.store
        .append(&logged(ExportType::Update, 2, run_start, start_time() - Duration::minutes(60)))
        .await
        .unwrap();
    h.store
        .append(&logged(ExportType::New, 1, run_start, start_time() - Duration::minutes(30)))
        .await
        .unwrap();

    let summary = h.run(by_ids(&[9]), false).await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);

    // Same history, but the NEW has not reached the mirror
    h.mirror.remove(RecordType::Bib, RecordId::new(1));
    let summary = h.run(by_ids(&[9]), false).await.unwrap();

    assert!(matches!(summary.outcome, RunOutcome::GateAborted { .. }));
}

#[tokio::test]
async fn test_gate_grace_window_lets_stuck_export_pass() {
    let mut h = Harness::new(RecordType::Bib);
    h.settings.gate.grace_window_secs = Some(300);
    h.store.insert_record(bib(1, "Annual report"));
    h.mirror.set_apply(false);
    h.run(by_ids(&[1]), true).await.unwrap();

    let within = h.run(by_ids(&[1]), false).await.unwrap();
    assert!(matches!(within.outcome, RunOutcome::GateAborted { .. }));

    h.clock.advance(std::time::Duration::from_secs(600));
    let after = h.run(by_ids(&[1]), false).await.unwrap();

    assert_eq!(after.outcome, RunOutcome::Completed);
    assert_eq!(after.warnings.len(), 1);
    assert!(after.warnings[0].contains("grace window"));
}

#[tokio::test]
async fn test_gate_deletion_pending_then_landed_by_purge() {
    let h = Harness::new(RecordType::Bib);
    h.mirror
        .insert(RecordType::Bib, RecordId::new(2), mirror_copy(2, "Withdrawn"));
    h.store
        .delete_record(RecordType::Bib, RecordId::new(2), start_time() - Duration::minutes(30));
    let window = CriteriaArgs {
        modified_within: Some(7200),
        ..Default::default()
    };

    h.mirror.set_apply(false);
    let first = h.run(window.clone(), true).await.unwrap();
    assert_eq!(first.deleted_records, 1);

    let pending = h.run(window.clone(), false).await.unwrap();
    assert!(matches!(pending.outcome, RunOutcome::GateAborted { .. }));

    // A record gone from the mirror counts as deleted
    h.mirror.remove(RecordType::Bib, RecordId::new(2));
    let landed = h.run(window, false).await.unwrap();

    assert_eq!(landed.outcome, RunOutcome::Completed);
    assert_eq!(landed.converged, 1);
    assert_eq!(h.mirror.submissions().len(), 1);
}

#[tokio::test]
async fn test_gate_fails_when_updated_record_vanishes() {
    let h = Harness::new(RecordType::Bib);
    h.store.insert_record(bib(3, "New title"));
    h.mirror
        .insert(RecordType::Bib, RecordId::new(3), mirror_copy(3, "Old title"));
    h.run(by_ids(&[3]), true).await.unwrap();

    h.mirror.remove(RecordType::Bib, RecordId::new(3));
    let err = h.run(by_ids(&[3]), false).await.unwrap_err();

    assert!(matches!(err, SyncError::Consistency(_)));
}

#[tokio::test]
async fn test_symbol_file_size_mismatch_triggers_whole_update() {
    let h = Harness::new(RecordType::Bib);
    h.store
        .insert_record(bib(1, "Annual report").with_field(symbol("A/RES/1")));
    h.store.add_file(
        stored("files.un.org/A_RES_1-EN.pdf", 100, vec![Language::EN]),
        &["A/RES/1"],
    );
    h.mirror.register_file("https://files.un.org/A_RES_1-EN.pdf", 100);

    let mut copy = mirror_copy(1, "Annual report");
    copy.push(symbol("A/RES/1"));
    copy.push(hosted(1, "A_RES_1-EN.pdf", 50));
    h.mirror.insert(RecordType::Bib, RecordId::new(1), copy);

    let first = h.run(by_ids(&[1]), true).await.unwrap();

    assert_eq!(first.updated_records, 1);
    assert_eq!(h.mirror.submissions()[0].mode, SubmitMode::InsertOrReplace);
    let copy = h.mirror.get(RecordType::Bib, RecordId::new(1)).unwrap();
    assert_eq!(copy.get_value("856", 's'), Some("100"));

    let second = h.run(by_ids(&[1]), true).await.unwrap();
    assert_eq!(second.submitted(), 0);
    assert_eq!(second.converged, 1);
}

#[tokio::test]
async fn test_missing_language_file_triggers_whole_update() {
    let h = Harness::new(RecordType::Bib);
    h.store
        .insert_record(bib(1, "Annual report").with_field(symbol("A/RES/1")));
    h.store.add_file(
        stored("files.un.org/A_RES_1-EN.pdf", 100, vec![Language::EN]),
        &["A/RES/1"],
    );
    h.store.add_file(
        stored("files.un.org/A_RES_1-FR.pdf", 120, vec![Language::FR]),
        &["A/RES/1"],
    );

    let mut copy = mirror_copy(1, "Annual report");
    copy.push(symbol("A/RES/1"));
    copy.push(hosted(1, "A_RES_1-EN.pdf", 100));
    h.mirror.insert(RecordType::Bib, RecordId::new(1), copy);

    let summary = h.run(by_ids(&[1]), true).await.unwrap();

    assert_eq!(summary.updated_records, 1);
    assert_eq!(h.mirror.submissions()[0].mode, SubmitMode::InsertOrReplace);
    let copy = h.mirror.get(RecordType::Bib, RecordId::new(1)).unwrap();
    assert!(copy
        .get_values("856", 'u')
        .iter()
        .any(|u| u.ends_with("A_RES_1-FR.pdf")));
}

#[tokio::test]
async fn test_uri_file_missing_from_mirror_triggers_whole_update() {
    let h = Harness::new(RecordType::Bib);
    let provenance = Field::data(
        "561",
        ' ',
        ' ',
        vec![Subfield::new('u', "files.un.org/letters/letter.pdf")],
    );
    h.store
        .insert_record(bib(1, "Annual report").with_field(provenance.clone()));
    h.store
        .add_file(stored("files.un.org/letters/letter.pdf", 10, vec![Language::EN]), &[]);

    let mut copy = mirror_copy(1, "Annual report");
    copy.push(provenance);
    h.mirror.insert(RecordType::Bib, RecordId::new(1), copy);

    let summary = h.run(by_ids(&[1]), true).await.unwrap();

    assert_eq!(summary.updated_records, 1);
    assert_eq!(h.mirror.submissions()[0].mode, SubmitMode::InsertOrReplace);
    let copy = h.mirror.get(RecordType::Bib, RecordId::new(1)).unwrap();
    assert!(copy
        .get_values("856", 'u')
        .iter()
        .any(|u| u.ends_with("/letter.pdf")));
}

#[tokio::test]
async fn test_whitelisted_link_missing_from_mirror_triggers_whole_update() {
    let h = Harness::new(RecordType::Bib);
    let link = Field::data(
        "856",
        '4',
        '0',
        vec![Subfield::new('u', "https://dag.un.org/scans/map.tiff")],
    );
    h.store.insert_record(bib(1, "Annual report").with_field(link));
    h.mirror
        .insert(RecordType::Bib, RecordId::new(1), mirror_copy(1, "Annual report"));

    let summary = h.run(by_ids(&[1]), true).await.unwrap();

    assert_eq!(summary.updated_records, 1);
    assert_eq!(h.mirror.submissions()[0].mode, SubmitMode::InsertOrReplace);
    let copy = h.mirror.get(RecordType::Bib, RecordId::new(1)).unwrap();
    assert!(copy
        .get_values("856", 'u')
        .iter()
        .any(|u| u.ends_with("/map.tiff")));
}
