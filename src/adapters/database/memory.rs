//! In-process store implementing every store trait
//!
//! Used by tests and by local dry runs against fixture data.

use super::traits::{
    AlertStateStore, CallbackLog, DatabaseClient, DeletedRecord, ExportLog, FileStore, QueueStore,
    RecordSource,
};
use crate::domain::{
    AlertState, CallbackEntry, Collection, ExportId, ExportLogEntry, ExportType, Language,
    MarcFields, QueueEntry, Record, RecordFilter, RecordId, RecordType, Result, SourceName, StoredFile,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct FileEntry {
    file: StoredFile,
    symbols: Vec<String>,
}

#[derive(Debug, Default)]
struct State {
    records: HashMap<(RecordType, RecordId), Record>,
    deletions: Vec<(RecordType, DeletedRecord)>,
    files: Vec<FileEntry>,
    blacklist: HashSet<String>,
    log: Vec<ExportLogEntry>,
    queue: Vec<QueueEntry>,
    callbacks: Vec<CallbackEntry>,
    alerts: Vec<AlertState>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

fn in_window(time: DateTime<Utc>, from: DateTime<Utc>, to: Option<DateTime<Utc>>) -> bool {
    time >= from && to.map_or(true, |to| time <= to)
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_record(&self, record: Record) {
        self.state()
            .records
            .insert((record.record_type, record.id), record);
    }

    /// Removes a record and writes the deletion to history
    pub fn delete_record(&self, record_type: RecordType, id: RecordId, at: DateTime<Utc>) {
        let mut state = self.state();
        state.records.remove(&(record_type, id));
        state
            .deletions
            .push((record_type, DeletedRecord { id, deleted: at }));
    }

    pub fn add_file(&self, file: StoredFile, symbols: &[&str]) {
        self.state().files.push(FileEntry {
            file,
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
        });
    }

    pub fn blacklist_symbol(&self, symbol: &str) {
        self.state().blacklist.insert(symbol.to_string());
    }

    pub fn add_callback(&self, entry: CallbackEntry) {
        self.state().callbacks.push(entry);
    }

    pub fn log_entries(&self) -> Vec<ExportLogEntry> {
        self.state().log.clone()
    }

    pub fn queue_entries(&self) -> Vec<QueueEntry> {
        self.state().queue.clone()
    }

    pub fn alert_states(&self) -> Vec<AlertState> {
        self.state().alerts.clone()
    }
}

#[async_trait]
impl DatabaseClient for InMemoryStore {
    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl RecordSource for InMemoryStore {
    async fn find_by_ids(&self, record_type: RecordType, ids: &[RecordId]) -> Result<Vec<Record>> {
        let state = self.state();
        Ok(ids
            .iter()
            .filter_map(|id| state.records.get(&(record_type, *id)).cloned())
            .collect())
    }

    async fn find_updated_between(
        &self,
        record_type: RecordType,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Record>> {
        Ok(self
            .state()
            .records
            .values()
            .filter(|r| r.record_type == record_type)
            .filter(|r| r.updated.map_or(false, |u| in_window(u, from, to)))
            .cloned()
            .collect())
    }

    async fn find_by_symbols(&self, symbols: &[String]) -> Result<Vec<Record>> {
        Ok(self
            .state()
            .records
            .values()
            .filter(|r| r.record_type == RecordType::Bib)
            .filter(|r| {
                r.get_values("191", 'a')
                    .iter()
                    .any(|s| symbols.iter().any(|wanted| wanted == s))
            })
            .cloned()
            .collect())
    }

    async fn find_by_filter(
        &self,
        record_type: RecordType,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>> {
        Ok(self
            .state()
            .records
            .values()
            .filter(|r| r.record_type == record_type && filter.matches(*r))
            .cloned()
            .collect())
    }

    async fn deleted_between(
        &self,
        record_type: RecordType,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<DeletedRecord>> {
        Ok(self
            .state()
            .deletions
            .iter()
            .filter(|(rt, d)| *rt == record_type && in_window(d.deleted, from, to))
            .map(|(_, d)| d.clone())
            .collect())
    }

    async fn deletions_of(
        &self,
        record_type: RecordType,
        ids: &[RecordId],
    ) -> Result<Vec<DeletedRecord>> {
        Ok(self
            .state()
            .deletions
            .iter()
            .filter(|(rt, d)| *rt == record_type && ids.contains(&d.id))
            .map(|(_, d)| d.clone())
            .collect())
    }

    async fn existing_ids(
        &self,
        record_type: RecordType,
        ids: &[RecordId],
    ) -> Result<HashSet<RecordId>> {
        let state = self.state();
        Ok(ids
            .iter()
            .filter(|id| state.records.contains_key(&(record_type, **id)))
            .copied()
            .collect())
    }

    async fn latest_update(&self, record_type: RecordType) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .state()
            .records
            .values()
            .filter(|r| r.record_type == record_type)
            .filter_map(|r| r.updated)
            .max())
    }

    async fn earliest_updated_after(
        &self,
        record_type: RecordType,
        after: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .state()
            .records
            .values()
            .filter(|r| r.record_type == record_type)
            .filter_map(|r| r.updated)
            .filter(|u| *u > after)
            .min())
    }

    async fn blacklisted_symbols(&self) -> Result<HashSet<String>> {
        Ok(self.state().blacklist.clone())
    }
}

#[async_trait]
impl FileStore for InMemoryStore {
    async fn latest_by_symbol_language(
        &self,
        symbol: &str,
        language: Language,
    ) -> Result<Option<StoredFile>> {
        Ok(self
            .state()
            .files
            .iter()
            .filter(|e| e.symbols.iter().any(|s| s == symbol))
            .filter(|e| e.file.languages.contains(&language))
            .max_by_key(|e| e.file.timestamp)
            .map(|e| e.file.clone()))
    }

    async fn find_by_uri(&self, uri: &str) -> Result<Option<StoredFile>> {
        Ok(self
            .state()
            .files
            .iter()
            .filter(|e| e.file.uri == uri)
            .max_by_key(|e| e.file.timestamp)
            .map(|e| e.file.clone()))
    }

    async fn symbols_changed_between(
        &self,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<String>> {
        let mut symbols = Vec::new();
        for entry in self
            .state()
            .files
            .iter()
            .filter(|e| in_window(e.file.timestamp, from, to))
        {
            for symbol in &entry.symbols {
                if !symbols.contains(symbol) {
                    symbols.push(symbol.clone());
                }
            }
        }
        Ok(symbols)
    }
}

#[async_trait]
impl ExportLog for InMemoryStore {
    async fn append(&self, entry: &ExportLogEntry) -> Result<()> {
        self.state().log.push(entry.clone());
        Ok(())
    }

    async fn recent(
        &self,
        source: &SourceName,
        record_type: RecordType,
        limit: usize,
    ) -> Result<Vec<ExportLogEntry>> {
        let mut entries: Vec<ExportLogEntry> = self
            .state()
            .log
            .iter()
            .filter(|e| &e.source == source && e.record_type == record_type)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.time.cmp(&a.time));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn latest_in_run(
        &self,
        source: &SourceName,
        record_type: RecordType,
        export_start: DateTime<Utc>,
        export_type: ExportType,
    ) -> Result<Option<ExportLogEntry>> {
        Ok(self
            .state()
            .log
            .iter()
            .filter(|e| &e.source == source && e.record_type == record_type)
            .filter(|e| e.export_start == export_start && e.export_type == export_type)
            .max_by_key(|e| e.time)
            .cloned())
    }

    async fn last_successful(
        &self,
        source: Option<&SourceName>,
        record_type: RecordType,
    ) -> Result<Option<ExportLogEntry>> {
        Ok(self
            .state()
            .log
            .iter()
            .filter(|e| e.record_type == record_type && e.is_success())
            .filter(|e| source.map_or(true, |s| &e.source == s))
            .max_by_key(|e| e.time)
            .cloned())
    }
}

#[async_trait]
impl QueueStore for InMemoryStore {
    async fn enqueue(&self, entries: &[QueueEntry]) -> Result<usize> {
        let mut state = self.state();
        let mut added = 0;
        for entry in entries {
            let exists = state.queue.iter().any(|q| {
                q.source == entry.source
                    && q.record_type == entry.record_type
                    && q.record_id == entry.record_id
            });
            if !exists {
                state.queue.push(entry.clone());
                added += 1;
            }
        }
        Ok(added)
    }

    async fn remove(
        &self,
        source: &SourceName,
        record_type: RecordType,
        ids: &[RecordId],
    ) -> Result<usize> {
        let mut state = self.state();
        let before = state.queue.len();
        state.queue.retain(|q| {
            !(&q.source == source && q.record_type == record_type && ids.contains(&q.record_id))
        });
        Ok(before - state.queue.len())
    }

    async fn queued_ids(
        &self,
        source: &SourceName,
        record_type: RecordType,
    ) -> Result<Vec<RecordId>> {
        Ok(self
            .state()
            .queue
            .iter()
            .filter(|q| &q.source == source && q.record_type == record_type)
            .map(|q| q.record_id)
            .collect())
    }

    async fn count(&self, source: &SourceName, record_type: RecordType) -> Result<usize> {
        Ok(self
            .state()
            .queue
            .iter()
            .filter(|q| &q.source == source && q.record_type == record_type)
            .count())
    }
}

#[async_trait]
impl CallbackLog for InMemoryStore {
    async fn latest_for_export(
        &self,
        record_type: RecordType,
        record_id: RecordId,
        export_id: ExportId,
    ) -> Result<Option<CallbackEntry>> {
        Ok(self
            .state()
            .callbacks
            .iter()
            .filter(|c| {
                c.record_type == record_type
                    && c.record_id == record_id
                    && c.export_id == Some(export_id)
            })
            .max_by_key(|c| c.time)
            .cloned())
    }
}

#[async_trait]
impl AlertStateStore for InMemoryStore {
    async fn latest(&self, collection: Collection) -> Result<Option<AlertState>> {
        Ok(self
            .state()
            .alerts
            .iter()
            .filter(|a| a.collection == collection)
            .max_by_key(|a| a.time)
            .cloned())
    }

    async fn record(&self, state: &AlertState) -> Result<()> {
        self.state().alerts.push(state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Field, Subfield};
    use chrono::{Duration, TimeZone};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    fn source() -> SourceName {
        SourceName::new("test").unwrap()
    }

    fn queued(id: u64) -> QueueEntry {
        QueueEntry {
            time: at(1),
            source: source(),
            record_type: RecordType::Bib,
            record_id: RecordId::new(id),
        }
    }

    #[tokio::test]
    async fn test_queue_upsert_semantics() {
        let store = InMemoryStore::new();

        assert_eq!(store.enqueue(&[queued(1), queued(2)]).await.unwrap(), 2);
        assert_eq!(store.enqueue(&[queued(2), queued(3)]).await.unwrap(), 1);
        assert_eq!(store.count(&source(), RecordType::Bib).await.unwrap(), 3);
        assert_eq!(store.count(&source(), RecordType::Auth).await.unwrap(), 0);

        let removed = store
            .remove(&source(), RecordType::Bib, &[RecordId::new(1), RecordId::new(9)])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(
            store.queued_ids(&source(), RecordType::Bib).await.unwrap(),
            vec![RecordId::new(2), RecordId::new(3)]
        );
    }

    #[tokio::test]
    async fn test_updated_window_and_deletions() {
        let store = InMemoryStore::new();
        store.insert_record(Record::new(RecordType::Bib, 1).with_updated(at(2)));
        store.insert_record(Record::new(RecordType::Bib, 2).with_updated(at(5)));
        store.insert_record(Record::new(RecordType::Auth, 3).with_updated(at(3)));
        store.delete_record(RecordType::Bib, RecordId::new(4), at(3));

        let found = store
            .find_updated_between(RecordType::Bib, at(1), Some(at(3)))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, RecordId::new(1));

        let deleted = store
            .deleted_between(RecordType::Bib, at(1), None)
            .await
            .unwrap();
        assert_eq!(deleted[0].id, RecordId::new(4));

        assert_eq!(store.latest_update(RecordType::Bib).await.unwrap(), Some(at(5)));
        assert_eq!(
            store
                .earliest_updated_after(RecordType::Bib, at(2))
                .await
                .unwrap(),
            Some(at(5))
        );
    }

    #[tokio::test]
    async fn test_files_by_symbol_prefers_newest() {
        let store = InMemoryStore::new();
        let file = |uri: &str, ts: DateTime<Utc>| StoredFile {
            uri: uri.to_string(),
            filename: "doc.pdf".to_string(),
            size: 100,
            languages: vec![Language::EN],
            timestamp: ts,
        };
        store.add_file(file("bucket/old", at(1)), &["A/RES/1"]);
        store.add_file(file("bucket/new", at(2)), &["A/RES/1"]);

        let latest = store
            .latest_by_symbol_language("A/RES/1", Language::EN)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.uri, "bucket/new");
        assert!(store
            .latest_by_symbol_language("A/RES/1", Language::FR)
            .await
            .unwrap()
            .is_none());

        let changed = store
            .symbols_changed_between(at(2) - Duration::minutes(1), None)
            .await
            .unwrap();
        assert_eq!(changed, vec!["A/RES/1".to_string()]);
    }

    #[tokio::test]
    async fn test_find_by_symbols() {
        let store = InMemoryStore::new();
        store.insert_record(
            Record::new(RecordType::Bib, 1)
                .with_field(Field::data("191", ' ', ' ', vec![Subfield::new('a', "S/RES/2")])),
        );
        let found = store.find_by_symbols(&["S/RES/2".to_string()]).await.unwrap();
        assert_eq!(found.len(), 1);
    }
}
