//! Record transformation
//!
//! Turns a source record into the form the mirror ingests:
//!
//! - **Clean**: drop blank values and unresolved cross-references ([`clean`])
//! - **Control**: strip internal control fields, rewrite 035 and set 980 ([`control`])
//! - **Files**: derive FFT file transfer fields ([`files`])
//!
//! Work-in-progress bibs pass through untouched apart from cleaning.

pub mod clean;
pub mod control;
pub mod files;

pub use clean::clean_values;
pub use files::{clean_fn, encode_fn, mirror_file_name, mirror_has_file, quote};

use crate::adapters::database::FileStore;
use crate::domain::{MarcFields, Record, RecordType, Result};
use std::collections::HashSet;
use std::sync::Arc;

/// Prepares source records for submission
///
/// # Examples
///
/// ```
/// use dlsync::adapters::database::InMemoryStore;
/// use dlsync::core::transform::TransformPipeline;
/// use dlsync::domain::{Field, MarcFields, Record, RecordType, Subfield};
/// use std::collections::HashSet;
/// use std::sync::Arc;
///
/// # async fn example() -> dlsync::domain::Result<()> {
/// let pipeline = TransformPipeline::new(
///     Arc::new(InMemoryStore::new()),
///     vec!["dag.un.org".to_string()],
///     HashSet::new(),
/// );
///
/// let record = Record::new(RecordType::Bib, 7)
///     .with_field(Field::data("245", ' ', ' ', vec![Subfield::new('a', "Title")]));
///
/// let prepared = pipeline.prepare(&record).await?;
/// assert_eq!(prepared.get_value("035", 'a'), Some("(DHL)7"));
/// assert_eq!(prepared.get_value("980", 'a'), Some("BIB"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TransformPipeline {
    files: Arc<dyn FileStore>,
    file_host_whitelist: Vec<String>,
    blacklist: HashSet<String>,
}

impl TransformPipeline {
    pub fn new(
        files: Arc<dyn FileStore>,
        file_host_whitelist: Vec<String>,
        blacklist: HashSet<String>,
    ) -> Self {
        Self {
            files,
            file_host_whitelist,
            blacklist,
        }
    }

    pub fn file_host_whitelist(&self) -> &[String] {
        &self.file_host_whitelist
    }

    pub fn is_whitelisted(&self, host: &str) -> bool {
        self.file_host_whitelist.iter().any(|h| h == host)
    }

    pub fn is_blacklisted(&self, symbol: &str) -> bool {
        self.blacklist.contains(symbol)
    }

    /// Cleans and transforms a copy of `record`
    pub async fn prepare(&self, record: &Record) -> Result<Record> {
        let mut prepared = record.clone();
        clean_values(&mut prepared);
        self.transform(&mut prepared).await?;
        Ok(prepared)
    }

    /// Applies the type-specific transformation in place
    pub async fn transform(&self, record: &mut Record) -> Result<()> {
        match record.record_type {
            RecordType::Bib => self.transform_bib(record).await,
            RecordType::Auth => {
                control::strip_internal_controls(record);
                control::rewrite_control_numbers(record);
                control::set_record_status(record);
                Ok(())
            }
        }
    }

    async fn transform_bib(&self, record: &mut Record) -> Result<()> {
        if record.is_work_in_progress() {
            return Ok(());
        }

        let flagged = record
            .get_values("191", 'a')
            .into_iter()
            .any(|symbol| self.is_blacklisted(symbol));
        let resolution = record.get_values("091", 'a').contains(&"RES");

        if !flagged && !resolution {
            files::symbol_files(record, self.files.as_ref()).await?;
        }

        control::strip_internal_controls(record);
        control::rewrite_control_numbers(record);
        files::uri_files(record, self.files.as_ref()).await?;
        files::link_files(record, &self.file_host_whitelist);
        control::set_record_status(record);
        Ok(())
    }
}
