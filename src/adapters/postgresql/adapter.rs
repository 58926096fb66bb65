//! PostgreSQL adapter implementing the store traits
//!
//! Catalog tables are only read. Sync state tables are appended to, except
//! for the queue, which is an upsert/bulk-delete set.

use crate::adapters::database::traits::{
    AlertStateStore, CallbackLog, DatabaseClient, DeletedRecord, ExportLog, FileStore, QueueStore,
    RecordSource,
};
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::adapters::postgresql::models::{
    alert_state_from_row, callback_from_row, file_from_row, filter_documents, id_param,
    log_entry_from_row, record_from_row, record_id_from_row, symbol_document,
};
use crate::domain::{
    AlertState, CallbackEntry, Collection, ExportId, ExportLogEntry, ExportType, Language,
    QueueEntry, Record, RecordFilter, RecordId, RecordType, Result, SourceName, StoredFile,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_postgres::types::ToSql;

const RECORD_COLUMNS: &str = "record_type, id, fields, updated, updated_by";

const LOG_COLUMNS: &str = "export_id, export_start, export_type, time, source, record_type, \
                           record_id, response_code, response_text, xml, checksum";

/// PostgreSQL implementation of the store traits
pub struct PostgreSQLAdapter {
    client: Arc<PostgreSQLClient>,
}

impl PostgreSQLAdapter {
    /// Create a new PostgreSQL adapter
    pub fn new(client: PostgreSQLClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Create a new PostgreSQL adapter with an Arc-wrapped client
    pub fn new_with_arc(client: Arc<PostgreSQLClient>) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying client
    pub fn client(&self) -> &Arc<PostgreSQLClient> {
        &self.client
    }

    async fn query_records(
        &self,
        query: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Record>> {
        let rows = self.client.query(query, params).await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn query_log(
        &self,
        query: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Option<ExportLogEntry>> {
        let rows = self.client.query(query, params).await?;
        rows.first().map(log_entry_from_row).transpose()
    }
}

fn id_params(ids: &[RecordId]) -> Vec<i64> {
    ids.iter().copied().map(id_param).collect()
}

#[async_trait]
impl DatabaseClient for PostgreSQLAdapter {
    async fn test_connection(&self) -> Result<()> {
        self.client.test_connection().await
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.client.ensure_schema().await
    }
}

#[async_trait]
impl RecordSource for PostgreSQLAdapter {
    async fn find_by_ids(&self, record_type: RecordType, ids: &[RecordId]) -> Result<Vec<Record>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query =
            format!("SELECT {RECORD_COLUMNS} FROM records WHERE record_type = $1 AND id = ANY($2)");
        self.query_records(&query, &[&record_type.as_str(), &id_params(ids)])
            .await
    }

    async fn find_updated_between(
        &self,
        record_type: RecordType,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Record>> {
        let query = format!(
            "SELECT {RECORD_COLUMNS} FROM records \
             WHERE record_type = $1 AND updated >= $2 AND ($3::timestamptz IS NULL OR updated <= $3)"
        );
        self.query_records(&query, &[&record_type.as_str(), &from, &to])
            .await
    }

    async fn find_by_symbols(&self, symbols: &[String]) -> Result<Vec<Record>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let documents: Vec<serde_json::Value> =
            symbols.iter().map(|s| symbol_document(s)).collect();
        let query = format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE record_type = 'bib' AND fields @> ANY($1)"
        );
        self.query_records(&query, &[&documents]).await
    }

    async fn find_by_filter(
        &self,
        record_type: RecordType,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>> {
        let documents = filter_documents(filter);
        let record_type = record_type.as_str();

        let mut params: Vec<&(dyn ToSql + Sync)> = vec![&record_type];
        let mut clauses = Vec::with_capacity(documents.len());
        for (i, document) in documents.iter().enumerate() {
            clauses.push(format!("fields @> ${}", i + 2));
            params.push(document);
        }

        let mut query = format!("SELECT {RECORD_COLUMNS} FROM records WHERE record_type = $1");
        for clause in clauses {
            query.push_str(" AND ");
            query.push_str(&clause);
        }

        self.query_records(&query, &params).await
    }

    async fn deleted_between(
        &self,
        record_type: RecordType,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<DeletedRecord>> {
        let rows = self
            .client
            .query(
                "SELECT id, deleted FROM record_history \
                 WHERE record_type = $1 AND deleted >= $2 \
                 AND ($3::timestamptz IS NULL OR deleted <= $3)",
                &[&record_type.as_str(), &from, &to],
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(DeletedRecord {
                    id: record_id_from_row(row, "id")?,
                    deleted: row.get("deleted"),
                })
            })
            .collect()
    }

    async fn deletions_of(
        &self,
        record_type: RecordType,
        ids: &[RecordId],
    ) -> Result<Vec<DeletedRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self
            .client
            .query(
                "SELECT id, deleted FROM record_history \
                 WHERE record_type = $1 AND id = ANY($2)",
                &[&record_type.as_str(), &id_params(ids)],
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(DeletedRecord {
                    id: record_id_from_row(row, "id")?,
                    deleted: row.get("deleted"),
                })
            })
            .collect()
    }

    async fn existing_ids(
        &self,
        record_type: RecordType,
        ids: &[RecordId],
    ) -> Result<HashSet<RecordId>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let rows = self
            .client
            .query(
                "SELECT id FROM records WHERE record_type = $1 AND id = ANY($2)",
                &[&record_type.as_str(), &id_params(ids)],
            )
            .await?;

        rows.iter().map(|row| record_id_from_row(row, "id")).collect()
    }

    async fn latest_update(&self, record_type: RecordType) -> Result<Option<DateTime<Utc>>> {
        let rows = self
            .client
            .query(
                "SELECT MAX(updated) AS latest FROM records WHERE record_type = $1",
                &[&record_type.as_str()],
            )
            .await?;

        Ok(rows.first().and_then(|row| row.get("latest")))
    }

    async fn earliest_updated_after(
        &self,
        record_type: RecordType,
        after: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let rows = self
            .client
            .query(
                "SELECT MIN(updated) AS earliest FROM records \
                 WHERE record_type = $1 AND updated > $2",
                &[&record_type.as_str(), &after],
            )
            .await?;

        Ok(rows.first().and_then(|row| row.get("earliest")))
    }

    async fn blacklisted_symbols(&self) -> Result<HashSet<String>> {
        let rows = self.client.query("SELECT symbol FROM blacklist", &[]).await?;
        Ok(rows.iter().map(|row| row.get("symbol")).collect())
    }
}

#[async_trait]
impl FileStore for PostgreSQLAdapter {
    async fn latest_by_symbol_language(
        &self,
        symbol: &str,
        language: Language,
    ) -> Result<Option<StoredFile>> {
        let rows = self
            .client
            .query(
                "SELECT uri, filename, size, languages, timestamp FROM files \
                 WHERE $1 = ANY(symbols) AND $2 = ANY(languages) \
                 ORDER BY timestamp DESC LIMIT 1",
                &[&symbol, &language.code()],
            )
            .await?;

        rows.first().map(file_from_row).transpose()
    }

    async fn find_by_uri(&self, uri: &str) -> Result<Option<StoredFile>> {
        let rows = self
            .client
            .query(
                "SELECT uri, filename, size, languages, timestamp FROM files \
                 WHERE uri = $1 ORDER BY timestamp DESC LIMIT 1",
                &[&uri],
            )
            .await?;

        rows.first().map(file_from_row).transpose()
    }

    async fn symbols_changed_between(
        &self,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT DISTINCT unnest(symbols) AS symbol FROM files \
                 WHERE timestamp >= $1 AND ($2::timestamptz IS NULL OR timestamp <= $2)",
                &[&from, &to],
            )
            .await?;

        Ok(rows.iter().map(|row| row.get("symbol")).collect())
    }
}

#[async_trait]
impl ExportLog for PostgreSQLAdapter {
    async fn append(&self, entry: &ExportLogEntry) -> Result<()> {
        let query = format!(
            "INSERT INTO export_log ({LOG_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        );

        self.client
            .execute(
                &query,
                &[
                    entry.export_id.as_uuid(),
                    &entry.export_start,
                    &entry.export_type.as_str(),
                    &entry.time,
                    &entry.source.as_str(),
                    &entry.record_type.as_str(),
                    &id_param(entry.record_id),
                    &i32::from(entry.response_code),
                    &entry.response_text,
                    &entry.xml,
                    &entry.checksum,
                ],
            )
            .await?;

        tracing::debug!(
            export_id = %entry.export_id,
            record_id = %entry.record_id,
            response_code = entry.response_code,
            "Export log entry written"
        );
        Ok(())
    }

    async fn recent(
        &self,
        source: &SourceName,
        record_type: RecordType,
        limit: usize,
    ) -> Result<Vec<ExportLogEntry>> {
        let query = format!(
            "SELECT {LOG_COLUMNS} FROM export_log WHERE source = $1 AND record_type = $2 \
             ORDER BY time DESC LIMIT $3"
        );
        let rows = self
            .client
            .query(
                &query,
                &[&source.as_str(), &record_type.as_str(), &(limit as i64)],
            )
            .await?;

        rows.iter().map(log_entry_from_row).collect()
    }

    async fn latest_in_run(
        &self,
        source: &SourceName,
        record_type: RecordType,
        export_start: DateTime<Utc>,
        export_type: ExportType,
    ) -> Result<Option<ExportLogEntry>> {
        let query = format!(
            "SELECT {LOG_COLUMNS} FROM export_log \
             WHERE source = $1 AND record_type = $2 AND export_start = $3 AND export_type = $4 \
             ORDER BY time DESC LIMIT 1"
        );
        self.query_log(
            &query,
            &[
                &source.as_str(),
                &record_type.as_str(),
                &export_start,
                &export_type.as_str(),
            ],
        )
        .await
    }

    async fn last_successful(
        &self,
        source: Option<&SourceName>,
        record_type: RecordType,
    ) -> Result<Option<ExportLogEntry>> {
        let query = format!(
            "SELECT {LOG_COLUMNS} FROM export_log \
             WHERE record_type = $1 AND response_code BETWEEN 200 AND 299 \
             AND ($2::text IS NULL OR source = $2) \
             ORDER BY time DESC LIMIT 1"
        );
        let source = source.map(|s| s.as_str());
        self.query_log(&query, &[&record_type.as_str(), &source]).await
    }
}

#[async_trait]
impl QueueStore for PostgreSQLAdapter {
    async fn enqueue(&self, entries: &[QueueEntry]) -> Result<usize> {
        let mut added = 0;
        for entry in entries {
            added += self
                .client
                .execute(
                    "INSERT INTO export_queue (time, source, record_type, record_id) \
                     VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (source, record_type, record_id) DO NOTHING",
                    &[
                        &entry.time,
                        &entry.source.as_str(),
                        &entry.record_type.as_str(),
                        &id_param(entry.record_id),
                    ],
                )
                .await? as usize;
        }
        Ok(added)
    }

    async fn remove(
        &self,
        source: &SourceName,
        record_type: RecordType,
        ids: &[RecordId],
    ) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let removed = self
            .client
            .execute(
                "DELETE FROM export_queue \
                 WHERE source = $1 AND record_type = $2 AND record_id = ANY($3)",
                &[&source.as_str(), &record_type.as_str(), &id_params(ids)],
            )
            .await?;
        Ok(removed as usize)
    }

    async fn queued_ids(
        &self,
        source: &SourceName,
        record_type: RecordType,
    ) -> Result<Vec<RecordId>> {
        let rows = self
            .client
            .query(
                "SELECT record_id FROM export_queue \
                 WHERE source = $1 AND record_type = $2 ORDER BY record_id",
                &[&source.as_str(), &record_type.as_str()],
            )
            .await?;

        rows.iter()
            .map(|row| record_id_from_row(row, "record_id"))
            .collect()
    }

    async fn count(&self, source: &SourceName, record_type: RecordType) -> Result<usize> {
        let rows = self
            .client
            .query(
                "SELECT COUNT(*) AS queued FROM export_queue WHERE source = $1 AND record_type = $2",
                &[&source.as_str(), &record_type.as_str()],
            )
            .await?;

        let count: i64 = rows.first().map(|row| row.get("queued")).unwrap_or(0);
        Ok(count as usize)
    }
}

#[async_trait]
impl CallbackLog for PostgreSQLAdapter {
    async fn latest_for_export(
        &self,
        record_type: RecordType,
        record_id: RecordId,
        export_id: ExportId,
    ) -> Result<Option<CallbackEntry>> {
        let rows = self
            .client
            .query(
                "SELECT time, record_type, record_id, export_id, success, message \
                 FROM callback_log \
                 WHERE record_type = $1 AND record_id = $2 AND export_id = $3 \
                 ORDER BY time DESC LIMIT 1",
                &[
                    &record_type.as_str(),
                    &id_param(record_id),
                    export_id.as_uuid(),
                ],
            )
            .await?;

        rows.first().map(callback_from_row).transpose()
    }
}

#[async_trait]
impl AlertStateStore for PostgreSQLAdapter {
    async fn latest(&self, collection: Collection) -> Result<Option<AlertState>> {
        let rows = self
            .client
            .query(
                "SELECT time, pending_secs FROM alert_state \
                 WHERE collection = $1 ORDER BY time DESC LIMIT 1",
                &[&collection.as_str()],
            )
            .await?;

        Ok(rows.first().map(|row| alert_state_from_row(row, collection)))
    }

    async fn record(&self, state: &AlertState) -> Result<()> {
        self.client
            .execute(
                "INSERT INTO alert_state (collection, time, pending_secs) VALUES ($1, $2, $3)",
                &[&state.collection.as_str(), &state.time, &state.pending_secs],
            )
            .await?;
        Ok(())
    }
}
