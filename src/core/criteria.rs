//! Candidate selection
//!
//! Exactly one criterion picks the records a run checks. Time windows also
//! pull in deletions from the source history and, for bibs, records whose
//! attached files changed inside the window.

use crate::adapters::database::DeletedRecord;
use crate::core::context::SyncContext;
use crate::core::queue::QueueManager;
use crate::domain::{Record, RecordFilter, RecordId, RecordType, Result, SyncError};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Raw selection arguments as given on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CriteriaArgs {
    pub id: Option<RecordId>,
    pub ids: Vec<RecordId>,
    pub list: Option<PathBuf>,
    pub modified_from: Option<DateTime<Utc>>,
    pub modified_to: Option<DateTime<Utc>>,
    /// Seconds before now
    pub modified_within: Option<u64>,
    /// Seconds before now
    pub modified_until: Option<u64>,
    pub modified_since_log: bool,
    /// JSON filter document
    pub query: Option<String>,
    pub querystring: Option<String>,
    /// Merge queued ids into the candidates
    pub queue: bool,
    /// Only deletions from the history
    pub delete_only: bool,
}

/// A validated selection criterion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criterion {
    Ids(Vec<RecordId>),
    List(PathBuf),
    ModifiedBetween {
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    },
    ModifiedWithin {
        within_secs: u64,
        until_secs: Option<u64>,
    },
    ModifiedSinceLog,
    Query(RecordFilter),
}

impl CriteriaArgs {
    /// Validates the arguments into a single criterion
    ///
    /// `Ok(None)` means the queue alone selects the candidates.
    ///
    /// # Errors
    ///
    /// Returns `AmbiguousCriteria` when no criterion or more than one is
    /// given, or when `delete_only` comes without a time window. Returns
    /// `Validation` for a bound without its start or an unparseable query.
    pub fn criterion(&self) -> Result<Option<Criterion>> {
        if self.modified_to.is_some() && self.modified_from.is_none() {
            return Err(SyncError::Validation(
                "--modified-to not valid without --modified-from".to_string(),
            ));
        }
        if self.modified_until.is_some() && self.modified_within.is_none() {
            return Err(SyncError::Validation(
                "--modified-until not valid without --modified-within".to_string(),
            ));
        }

        let mut given: Vec<Criterion> = Vec::new();
        if let Some(id) = self.id {
            given.push(Criterion::Ids(vec![id]));
        }
        if !self.ids.is_empty() {
            given.push(Criterion::Ids(self.ids.clone()));
        }
        if let Some(path) = &self.list {
            given.push(Criterion::List(path.clone()));
        }
        if let Some(from) = self.modified_from {
            given.push(Criterion::ModifiedBetween {
                from,
                to: self.modified_to,
            });
        }
        if let Some(within_secs) = self.modified_within {
            given.push(Criterion::ModifiedWithin {
                within_secs,
                until_secs: self.modified_until,
            });
        }
        if self.modified_since_log {
            given.push(Criterion::ModifiedSinceLog);
        }
        if let Some(json) = &self.query {
            let filter = RecordFilter::from_json(json).map_err(SyncError::Validation)?;
            given.push(Criterion::Query(filter));
        }
        if let Some(query) = &self.querystring {
            let filter = RecordFilter::from_querystring(query).map_err(SyncError::Validation)?;
            given.push(Criterion::Query(filter));
        }

        let selects_records = |c: &Criterion| {
            matches!(c, Criterion::Ids(_) | Criterion::List(_) | Criterion::Query(_))
        };
        if self.delete_only && given.iter().any(selects_records) {
            return Err(SyncError::AmbiguousCriteria(
                "--delete-only is only valid with a modification window".to_string(),
            ));
        }

        match given.len() {
            0 if self.queue => Ok(None),
            0 => Err(SyncError::AmbiguousCriteria(
                "One of the criteria arguments is required".to_string(),
            )),
            1 => Ok(given.pop()),
            n => Err(SyncError::AmbiguousCriteria(format!(
                "{n} criteria given; they are mutually exclusive"
            ))),
        }
    }
}

/// Records to check and deletions to propagate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidates {
    /// Live records, most recently updated first
    pub records: Vec<Record>,
    /// Tombstones for records deleted from the source
    pub tombstones: Vec<Record>,
}

impl Candidates {
    pub fn len(&self) -> usize {
        self.records.len() + self.tombstones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Processing order: live records, then tombstones
    pub fn into_sequence(self) -> Vec<Record> {
        let mut all = self.records;
        all.extend(self.tombstones);
        all
    }
}

/// Reads an id list: one id per line, first tab-separated column
pub fn read_id_list(path: &Path, max: usize) -> Result<Vec<RecordId>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SyncError::Validation(format!("Cannot read id list {}: {e}", path.display())))?;

    let mut ids = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let first = line.split('\t').next().unwrap_or_default().trim();
        if first.is_empty() {
            continue;
        }
        let id = first.parse::<RecordId>().map_err(|e| {
            SyncError::Validation(format!("{}:{}: {e}", path.display(), number + 1))
        })?;
        ids.push(id);
    }

    if ids.len() > max {
        return Err(SyncError::Validation(format!(
            "Max {max} ids from list, got {}",
            ids.len()
        )));
    }
    Ok(ids)
}

fn newest_first(records: &mut [Record]) {
    records.sort_by(|a, b| b.updated.cmp(&a.updated));
}

fn merge_unique(into: &mut Vec<Record>, more: Vec<Record>) {
    let mut seen: HashSet<RecordId> = into.iter().map(|r| r.id).collect();
    into.extend(more.into_iter().filter(|r| seen.insert(r.id)));
}

/// Latest deletion time per record
fn latest_deletions(deleted: Vec<DeletedRecord>) -> HashMap<RecordId, DateTime<Utc>> {
    let mut latest: HashMap<RecordId, DateTime<Utc>> = HashMap::new();
    for d in deleted {
        let entry = latest.entry(d.id).or_insert(d.deleted);
        if d.deleted > *entry {
            *entry = d.deleted;
        }
    }
    latest
}

/// `now - secs`, rejecting spans chrono cannot represent
fn seconds_before(now: DateTime<Utc>, secs: u64) -> Result<DateTime<Utc>> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|span| now.checked_sub_signed(span))
        .ok_or_else(|| SyncError::Configuration(format!("Time window of {secs}s is out of range")))
}

pub struct CriteriaResolver<'a> {
    ctx: &'a SyncContext,
    queue: &'a QueueManager,
}

impl<'a> CriteriaResolver<'a> {
    pub fn new(ctx: &'a SyncContext, queue: &'a QueueManager) -> Self {
        Self { ctx, queue }
    }

    fn record_type(&self) -> RecordType {
        self.ctx.record_type()
    }

    /// Resolves the arguments into candidates
    pub async fn resolve(&self, args: &CriteriaArgs) -> Result<Candidates> {
        let mut candidates = match args.criterion()? {
            Some(criterion) => self.by_criterion(criterion, args.delete_only).await?,
            None => Candidates::default(),
        };

        if args.queue {
            self.merge_queue(&mut candidates).await?;
        }

        tracing::info!(
            record_type = %self.record_type(),
            records = candidates.records.len(),
            tombstones = candidates.tombstones.len(),
            "Resolved candidates"
        );
        Ok(candidates)
    }

    async fn by_criterion(&self, criterion: Criterion, delete_only: bool) -> Result<Candidates> {
        let records = self.ctx.stores.records.as_ref();
        let record_type = self.record_type();

        let mut found = match criterion {
            Criterion::Ids(ids) => records.find_by_ids(record_type, &ids).await?,
            Criterion::List(path) => {
                let ids = read_id_list(&path, self.ctx.settings.max_list_ids)?;
                records.find_by_ids(record_type, &ids).await?
            }
            Criterion::Query(filter) => records.find_by_filter(record_type, &filter).await?,
            Criterion::ModifiedBetween { from, to } => {
                return self.by_window(from, to, delete_only).await;
            }
            Criterion::ModifiedWithin {
                within_secs,
                until_secs,
            } => {
                let now = self.ctx.clock.now();
                let from = seconds_before(now, within_secs)?;
                let to = until_secs
                    .map(|secs| seconds_before(now, secs))
                    .transpose()?;
                return self.by_window(from, to, delete_only).await;
            }
            Criterion::ModifiedSinceLog => {
                let last = self
                    .ctx
                    .stores
                    .log
                    .recent(self.ctx.source(), record_type, 1)
                    .await?;
                let Some(last) = last.first() else {
                    return Err(SyncError::Validation(format!(
                        "No export history for source '{}' and type {record_type}; \
                         --modified-since-log needs a previous run",
                        self.ctx.source()
                    )));
                };
                return self.by_window(last.export_start, None, delete_only).await;
            }
        };

        newest_first(&mut found);
        Ok(Candidates {
            records: found,
            tombstones: Vec::new(),
        })
    }

    /// Records updated in the window plus deletions recorded in it
    pub async fn by_window(
        &self,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
        delete_only: bool,
    ) -> Result<Candidates> {
        let stores = &self.ctx.stores;
        let record_type = self.record_type();

        let mut records = Vec::new();
        if !delete_only {
            records = stores
                .records
                .find_updated_between(record_type, from, to)
                .await?;

            if record_type == RecordType::Bib {
                let symbols = stores.files.symbols_changed_between(from, to).await?;
                if symbols.len() > self.ctx.settings.max_file_symbols {
                    return Err(SyncError::Validation(format!(
                        "Files changed for {} symbols, more than the {} that can be looked up",
                        symbols.len(),
                        self.ctx.settings.max_file_symbols
                    )));
                }
                tracing::debug!(symbols = symbols.len(), "Found files changed in window");
                if !symbols.is_empty() {
                    let by_files = stores.records.find_by_symbols(&symbols).await?;
                    merge_unique(&mut records, by_files);
                }
            }
            newest_first(&mut records);
        }

        let tombstones = self.tombstones(from, to).await?;
        Ok(Candidates {
            records,
            tombstones,
        })
    }

    /// Deletions in the window, minus records restored since
    async fn tombstones(
        &self,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Record>> {
        let record_type = self.record_type();
        let deleted = self
            .ctx
            .stores
            .records
            .deleted_between(record_type, from, to)
            .await?;

        let latest = latest_deletions(deleted);
        let ids: Vec<RecordId> = latest.keys().copied().collect();
        let restored = self
            .ctx
            .stores
            .records
            .existing_ids(record_type, &ids)
            .await?;

        let mut tombstones: Vec<Record> = latest
            .into_iter()
            .filter(|(id, _)| !restored.contains(id))
            .map(|(id, at)| Record::tombstone(record_type, id, at))
            .collect();
        newest_first(&mut tombstones);
        Ok(tombstones)
    }

    /// Adds queued ids, then orders live records oldest first
    ///
    /// Queued ids missing from the source come back as tombstones when the
    /// history has their deletion; ids with no trace at all are dropped.
    async fn merge_queue(&self, candidates: &mut Candidates) -> Result<()> {
        let queued = self.queue.pending().await?;
        tracing::info!(queued = queued.len(), "Taking records from queue");
        if queued.is_empty() {
            return Ok(());
        }

        let records = self.ctx.stores.records.as_ref();
        let record_type = self.record_type();
        let found = records.find_by_ids(record_type, &queued).await?;

        let found_ids: HashSet<RecordId> = found.iter().map(|r| r.id).collect();
        let missing: Vec<RecordId> = queued
            .iter()
            .copied()
            .filter(|id| !found_ids.contains(id))
            .collect();

        if !missing.is_empty() {
            let deleted = latest_deletions(records.deletions_of(record_type, &missing).await?);
            let gone: Vec<RecordId> = missing
                .iter()
                .copied()
                .filter(|id| !deleted.contains_key(id))
                .collect();

            let mut tombstones: Vec<Record> = deleted
                .into_iter()
                .map(|(id, at)| Record::tombstone(record_type, id, at))
                .collect();
            newest_first(&mut tombstones);
            merge_unique(&mut candidates.tombstones, tombstones);

            if !gone.is_empty() && self.ctx.settings.output.submits() {
                tracing::warn!(count = gone.len(), "Dropping queued ids no longer in the source");
                self.queue.complete(&gone).await?;
            }
        }

        merge_unique(&mut candidates.records, found);
        candidates.records.sort_by(|a, b| a.updated.cmp(&b.updated));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MarcFields;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use test_case::test_case;

    fn ids(values: &[u64]) -> Vec<RecordId> {
        values.iter().copied().map(RecordId::new).collect()
    }

    #[test]
    fn test_single_criterion() {
        let args = CriteriaArgs {
            ids: ids(&[1, 2]),
            ..Default::default()
        };
        assert_eq!(args.criterion().unwrap(), Some(Criterion::Ids(ids(&[1, 2]))));
    }

    #[test]
    fn test_no_criterion() {
        let err = CriteriaArgs::default().criterion().unwrap_err();
        assert!(matches!(err, SyncError::AmbiguousCriteria(_)));

        let queue_only = CriteriaArgs {
            queue: true,
            ..Default::default()
        };
        assert_eq!(queue_only.criterion().unwrap(), None);
    }

    #[test]
    fn test_conflicting_criteria() {
        let args = CriteriaArgs {
            id: Some(RecordId::new(1)),
            modified_within: Some(3600),
            ..Default::default()
        };
        assert!(matches!(
            args.criterion().unwrap_err(),
            SyncError::AmbiguousCriteria(_)
        ));
    }

    #[test_case(CriteriaArgs { modified_to: Some(Utc::now()), ..Default::default() } ; "to without from")]
    #[test_case(CriteriaArgs { modified_until: Some(60), ..Default::default() } ; "until without within")]
    #[test_case(CriteriaArgs { querystring: Some("191__a".to_string()), ..Default::default() } ; "bad querystring")]
    fn test_validation_errors(args: CriteriaArgs) {
        assert!(matches!(args.criterion().unwrap_err(), SyncError::Validation(_)));
    }

    #[test]
    fn test_window_criteria() {
        let from = Utc::now();
        let args = CriteriaArgs {
            modified_from: Some(from),
            ..Default::default()
        };
        assert_eq!(
            args.criterion().unwrap(),
            Some(Criterion::ModifiedBetween { from, to: None })
        );

        let args = CriteriaArgs {
            modified_within: Some(3600),
            modified_until: Some(60),
            ..Default::default()
        };
        assert_eq!(
            args.criterion().unwrap(),
            Some(Criterion::ModifiedWithin {
                within_secs: 3600,
                until_secs: Some(60)
            })
        );
    }

    #[test_case(CriteriaArgs { id: Some(RecordId::new(1)), delete_only: true, ..Default::default() } ; "id")]
    #[test_case(CriteriaArgs { list: Some(PathBuf::from("ids.txt")), delete_only: true, ..Default::default() } ; "list")]
    #[test_case(CriteriaArgs { querystring: Some("191__a:A/1".to_string()), delete_only: true, ..Default::default() } ; "querystring")]
    fn test_delete_only_needs_window(args: CriteriaArgs) {
        assert!(matches!(
            args.criterion().unwrap_err(),
            SyncError::AmbiguousCriteria(_)
        ));
    }

    #[test]
    fn test_delete_only_with_window() {
        let args = CriteriaArgs {
            modified_within: Some(60),
            delete_only: true,
            ..Default::default()
        };
        assert!(args.criterion().unwrap().is_some());
    }

    #[test]
    fn test_seconds_before() {
        let now = Utc::now();
        assert_eq!(seconds_before(now, 60).unwrap(), now - Duration::seconds(60));
        assert!(matches!(
            seconds_before(now, u64::MAX).unwrap_err(),
            SyncError::Configuration(_)
        ));
        assert!(matches!(
            seconds_before(now, i64::MAX as u64).unwrap_err(),
            SyncError::Configuration(_)
        ));
    }

    #[test]
    fn test_latest_deletions_keeps_newest() {
        let early = Utc::now() - Duration::hours(2);
        let late = Utc::now();
        let latest = latest_deletions(vec![
            DeletedRecord { id: RecordId::new(1), deleted: late },
            DeletedRecord { id: RecordId::new(1), deleted: early },
        ]);
        assert_eq!(latest.get(&RecordId::new(1)), Some(&late));
    }

    #[test]
    fn test_read_id_list() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "10\tsome title").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "11").unwrap();

        assert_eq!(read_id_list(file.path(), 5000).unwrap(), ids(&[10, 11]));
        assert!(matches!(
            read_id_list(file.path(), 1).unwrap_err(),
            SyncError::Validation(_)
        ));
    }

    #[test]
    fn test_read_id_list_rejects_garbage() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "abc").unwrap();

        let err = read_id_list(file.path(), 10).unwrap_err();
        assert!(err.to_string().contains(":1:"));
    }

    #[test]
    fn test_candidate_sequence_puts_tombstones_last() {
        let candidates = Candidates {
            records: vec![Record::new(RecordType::Bib, 1)],
            tombstones: vec![Record::tombstone(RecordType::Bib, RecordId::new(2), Utc::now())],
        };

        assert_eq!(candidates.len(), 2);
        let sequence = candidates.into_sequence();
        assert_eq!(sequence[1].id, RecordId::new(2));
        assert!(sequence[1].is_tombstone());
    }
}
