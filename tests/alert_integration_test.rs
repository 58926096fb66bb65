//! Integration tests for the staleness monitor working off sync runs

mod common;

use chrono::Duration;
use common::{by_ids, start_time, title, Harness};
use dlsync::adapters::database::Stores;
use dlsync::adapters::notify::LogNotifier;
use dlsync::core::alert::{AlertThresholds, CollectionStatus, StalenessMonitor};
use dlsync::domain::{Collection, Record, RecordType, SourceName};

fn monitor(h: &Harness) -> StalenessMonitor {
    StalenessMonitor::new(
        Stores::in_memory(h.store.clone()),
        Box::new(LogNotifier),
        h.clock.clone(),
        AlertThresholds {
            pending_secs: 7200,
            frequency_secs: 21600,
            inactivity_secs: 7200,
        },
    )
    .with_source(Some(SourceName::new("dlsync").unwrap()))
}

#[tokio::test]
async fn test_alert_cooldown_and_recovery() {
    let h = Harness::new(RecordType::Bib);
    for (id, hours) in [(1, 3), (2, 1)] {
        h.store.insert_record(
            Record::new(RecordType::Bib, id)
                .with_updated(start_time() - Duration::hours(hours))
                .with_field(title("Report")),
        );
    }
    let monitor = monitor(&h);

    let first = monitor.check().await.unwrap();
    assert_eq!(first.alerts_sent(), 1);
    assert!(matches!(
        first.status(Collection::Bibs),
        Some(CollectionStatus::Alerted { pending_secs: 10800 })
    ));
    assert_eq!(first.status(Collection::Auths), Some(&CollectionStatus::Quiet));

    h.clock.advance(std::time::Duration::from_secs(600));
    let second = monitor.check().await.unwrap();
    assert_eq!(second.alerts_sent(), 0);
    assert!(matches!(
        second.status(Collection::Bibs),
        Some(CollectionStatus::Suppressed { .. })
    ));
    assert_eq!(h.store.alert_states().len(), 1);

    let summary = h.run(by_ids(&[1, 2]), true).await.unwrap();
    assert_eq!(summary.new_records, 2);

    let third = monitor.check().await.unwrap();
    assert_eq!(third.status(Collection::Bibs), Some(&CollectionStatus::Quiet));
    assert_eq!(h.store.alert_states().len(), 1);
}
