//! Durable backlog of records a run could not get to
//!
//! Entries are keyed by source, record type and record id. Enqueueing an id
//! that is already queued is a no-op, so an interrupted run can always be
//! flushed again.

use crate::adapters::database::QueueStore;
use crate::domain::{QueueEntry, RecordId, RecordType, Result, SourceName};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Result of flushing the unprocessed remainder of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnqueueReport {
    /// Newly queued ids
    pub added: usize,
    /// Ids that were already in the queue
    pub already_queued: usize,
}

/// Queue operations scoped to one source and record type
pub struct QueueManager {
    store: Arc<dyn QueueStore>,
    source: SourceName,
    record_type: RecordType,
}

impl QueueManager {
    pub fn new(store: Arc<dyn QueueStore>, source: SourceName, record_type: RecordType) -> Self {
        Self {
            store,
            source,
            record_type,
        }
    }

    /// Ids currently waiting for this source and type
    pub async fn pending(&self) -> Result<Vec<RecordId>> {
        self.store.queued_ids(&self.source, self.record_type).await
    }

    pub async fn depth(&self) -> Result<usize> {
        self.store.count(&self.source, self.record_type).await
    }

    /// Upserts `ids` into the queue
    pub async fn enqueue(&self, ids: &[RecordId], now: DateTime<Utc>) -> Result<EnqueueReport> {
        if ids.is_empty() {
            return Ok(EnqueueReport::default());
        }

        let entries: Vec<QueueEntry> = ids
            .iter()
            .map(|id| QueueEntry {
                time: now,
                source: self.source.clone(),
                record_type: self.record_type,
                record_id: *id,
            })
            .collect();

        let added = self.store.enqueue(&entries).await?;
        let report = EnqueueReport {
            added,
            already_queued: ids.len().saturating_sub(added),
        };

        tracing::info!(
            source = %self.source,
            record_type = %self.record_type,
            added = report.added,
            already_queued = report.already_queued,
            "Queued unprocessed records"
        );

        Ok(report)
    }

    /// Bulk delete of ids processed in the current batch
    pub async fn complete(&self, ids: &[RecordId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let removed = self
            .store
            .remove(&self.source, self.record_type, ids)
            .await?;
        if removed > 0 {
            tracing::debug!(removed = removed, "Removed processed records from queue");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::database::InMemoryStore;

    fn manager(store: Arc<InMemoryStore>) -> QueueManager {
        QueueManager::new(store, SourceName::new("test").unwrap(), RecordType::Bib)
    }

    fn ids(values: &[u64]) -> Vec<RecordId> {
        values.iter().copied().map(RecordId::new).collect()
    }

    #[tokio::test]
    async fn test_enqueue_is_upsert() {
        let store = Arc::new(InMemoryStore::new());
        let queue = manager(store.clone());

        let first = queue.enqueue(&ids(&[1, 2]), Utc::now()).await.unwrap();
        let second = queue.enqueue(&ids(&[2, 3]), Utc::now()).await.unwrap();

        assert_eq!(first, EnqueueReport { added: 2, already_queued: 0 });
        assert_eq!(second, EnqueueReport { added: 1, already_queued: 1 });
        assert_eq!(queue.depth().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_queue_scoped_by_source_and_type() {
        let store = Arc::new(InMemoryStore::new());
        let bibs = manager(store.clone());
        let auths = QueueManager::new(
            store.clone(),
            SourceName::new("test").unwrap(),
            RecordType::Auth,
        );
        let other = QueueManager::new(
            store.clone(),
            SourceName::new("other").unwrap(),
            RecordType::Bib,
        );

        bibs.enqueue(&ids(&[1]), Utc::now()).await.unwrap();
        auths.enqueue(&ids(&[1]), Utc::now()).await.unwrap();

        assert_eq!(bibs.pending().await.unwrap(), ids(&[1]));
        assert_eq!(auths.pending().await.unwrap(), ids(&[1]));
        assert!(other.pending().await.unwrap().is_empty());
        assert_eq!(store.queue_entries().len(), 2);
    }

    #[tokio::test]
    async fn test_complete_removes_only_given_ids() {
        let store = Arc::new(InMemoryStore::new());
        let queue = manager(store);

        queue.enqueue(&ids(&[1, 2, 3]), Utc::now()).await.unwrap();
        let removed = queue.complete(&ids(&[1, 3, 9])).await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(queue.pending().await.unwrap(), ids(&[2]));
        assert_eq!(queue.complete(&[]).await.unwrap(), 0);
    }
}
