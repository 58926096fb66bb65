//! Store abstraction traits
//!
//! The sync engine reads the source catalog through [`RecordSource`] and
//! [`FileStore`] and keeps its own durable state through [`ExportLog`],
//! [`QueueStore`], [`CallbackLog`] and [`AlertStateStore`]. Every backend
//! implements all of them.

use crate::domain::{
    AlertState, CallbackEntry, Collection, ExportId, ExportLogEntry, ExportType, Language,
    QueueEntry, Record, RecordFilter, RecordId, RecordType, Result, SourceName, StoredFile,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// A deletion recorded in the source's history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedRecord {
    pub id: RecordId,
    pub deleted: DateTime<Utc>,
}

/// Connection management shared by every backend
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Test the database connection
    async fn test_connection(&self) -> Result<()>;

    /// Create tables and indexes that do not exist yet
    async fn ensure_schema(&self) -> Result<()>;
}

/// Read access to the authoritative catalog
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn find_by_ids(&self, record_type: RecordType, ids: &[RecordId]) -> Result<Vec<Record>>;

    /// Records whose `updated` falls in `[from, to]`; `to = None` is open-ended
    async fn find_updated_between(
        &self,
        record_type: RecordType,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Record>>;

    /// Bib records whose 191$a is one of `symbols`
    async fn find_by_symbols(&self, symbols: &[String]) -> Result<Vec<Record>>;

    async fn find_by_filter(
        &self,
        record_type: RecordType,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>>;

    /// Deletions recorded in the history within `[from, to]`
    async fn deleted_between(
        &self,
        record_type: RecordType,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<DeletedRecord>>;

    /// Every recorded deletion of one of `ids`, regardless of when
    async fn deletions_of(
        &self,
        record_type: RecordType,
        ids: &[RecordId],
    ) -> Result<Vec<DeletedRecord>>;

    /// Subset of `ids` that currently exist
    async fn existing_ids(
        &self,
        record_type: RecordType,
        ids: &[RecordId],
    ) -> Result<HashSet<RecordId>>;

    /// Most recent `updated` in the collection
    async fn latest_update(&self, record_type: RecordType) -> Result<Option<DateTime<Utc>>>;

    /// Oldest `updated` strictly after `after`
    async fn earliest_updated_after(
        &self,
        record_type: RecordType,
        after: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>>;

    /// Symbols whose files must not be linked automatically
    async fn blacklisted_symbols(&self) -> Result<HashSet<String>>;
}

/// Lookup of files attached to records
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Newest file for a document symbol in one language
    async fn latest_by_symbol_language(
        &self,
        symbol: &str,
        language: Language,
    ) -> Result<Option<StoredFile>>;

    /// Newest file stored at `uri` (scheme-less)
    async fn find_by_uri(&self, uri: &str) -> Result<Option<StoredFile>>;

    /// Distinct symbols with files stored within `[from, to]`
    async fn symbols_changed_between(
        &self,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<String>>;
}

/// Append-only submission history
#[async_trait]
pub trait ExportLog: Send + Sync {
    async fn append(&self, entry: &ExportLogEntry) -> Result<()>;

    /// Latest entries for a source and type, newest first
    async fn recent(
        &self,
        source: &SourceName,
        record_type: RecordType,
        limit: usize,
    ) -> Result<Vec<ExportLogEntry>>;

    /// Newest entry of `export_type` written by the run started at `export_start`
    async fn latest_in_run(
        &self,
        source: &SourceName,
        record_type: RecordType,
        export_start: DateTime<Utc>,
        export_type: ExportType,
    ) -> Result<Option<ExportLogEntry>>;

    /// Newest 2xx entry, optionally restricted to one source
    async fn last_successful(
        &self,
        source: Option<&SourceName>,
        record_type: RecordType,
    ) -> Result<Option<ExportLogEntry>>;
}

/// Durable backlog of deferred records
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Inserts entries not already queued; returns how many were added
    async fn enqueue(&self, entries: &[QueueEntry]) -> Result<usize>;

    /// Bulk delete; returns how many entries were removed
    async fn remove(
        &self,
        source: &SourceName,
        record_type: RecordType,
        ids: &[RecordId],
    ) -> Result<usize>;

    async fn queued_ids(&self, source: &SourceName, record_type: RecordType)
        -> Result<Vec<RecordId>>;

    async fn count(&self, source: &SourceName, record_type: RecordType) -> Result<usize>;
}

/// Import results posted back by the mirror
#[async_trait]
pub trait CallbackLog: Send + Sync {
    /// Newest callback reporting on the submission `export_id` of a record
    async fn latest_for_export(
        &self,
        record_type: RecordType,
        record_id: RecordId,
        export_id: ExportId,
    ) -> Result<Option<CallbackEntry>>;
}

#[async_trait]
pub trait AlertStateStore: Send + Sync {
    async fn latest(&self, collection: Collection) -> Result<Option<AlertState>>;

    async fn record(&self, state: &AlertState) -> Result<()>;
}
