//! Field-level comparison of a source record with its mirror copy
//!
//! The result is either nothing to do, a correction carrying only the tags
//! that differ, or an escalation to a whole-record update when the mirror's
//! files have drifted from the source's.

use crate::core::context::SyncContext;
use crate::core::transform::files::{document_symbols, last_segment, mirror_has_file, url_host};
use crate::core::transform::{clean_values, TransformPipeline};
use crate::domain::{Field, Language, MarcFields, MirrorRecord, Record, RecordType, Result, SyncError};
use crate::log_decision;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use unicode_normalization::UnicodeNormalization;

/// Tags never compared: control number, local and status fields
pub const SKIPPED_TAGS: [&str; 5] = ["035", "909", "949", "980", "998"];

/// Outcome of comparing one aligned record pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOutcome {
    /// Mirror copy matches the source
    Converged,
    /// Partial update carrying only the listed fields
    Correction(Record),
    /// The whole record must be resubmitted
    WholeUpdate { reason: String },
}

/// Tags to resubmit and mirror fields to delete
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldDiff {
    pub take_tags: BTreeSet<String>,
    pub delete_fields: Vec<Field>,
}

impl FieldDiff {
    pub fn is_empty(&self) -> bool {
        self.take_tags.is_empty() && self.delete_fields.is_empty()
    }
}

fn normalized(value: &str) -> String {
    value.nfd().collect()
}

fn compared(fields: &[Field]) -> impl Iterator<Item = &Field> {
    fields
        .iter()
        .filter(|f| !f.is_control() && !SKIPPED_TAGS.contains(&f.tag.as_str()))
}

/// Compares the data fields of a cleaned source record with a mirror record
///
/// `whitelist` lists the hosts whose 856 links are sent as file transfers;
/// `mirror_file_host` is the host serving files already ingested by the mirror.
pub fn compare_fields(
    source: &Record,
    mirror: &MirrorRecord,
    whitelist: &[String],
    mirror_file_host: &str,
) -> FieldDiff {
    let id = source.id;
    let mut diff = FieldDiff::default();

    let mut mirror_fields: Vec<Field> = compared(&mirror.fields).cloned().collect();
    for field in mirror_fields.iter_mut() {
        if let Some(xref) = field.get_value('0') {
            if !xref.starts_with("(DHLAUTH)") {
                log_decision!(id, "BAD XREF", field = %field.to_mrk());
                diff.take_tags.insert(field.tag.clone());
            }
        }
        if let Some(subfields) = field.subfields_mut() {
            subfields.retain(|s| s.code != '0');
        }
    }

    let mut source_fields: Vec<Field> = compared(&source.fields).cloned().collect();
    for field in source_fields.iter_mut() {
        if let Some(subfields) = field.subfields_mut() {
            subfields.retain(|s| s.value.is_some());
        }
    }

    let source_mrk: Vec<String> = source_fields.iter().map(Field::to_mrk).collect();
    let mirror_mrk: Vec<String> = mirror_fields.iter().map(Field::to_mrk).collect();
    let source_normalized: Vec<String> = source_mrk.iter().map(|m| normalized(m)).collect();
    let mirror_normalized: Vec<String> = mirror_mrk.iter().map(|m| normalized(m)).collect();

    for (field, mrk) in source_fields.iter().zip(&source_normalized) {
        if field.tag == "856" {
            let whitelisted = field
                .get_value('u')
                .and_then(url_host)
                .is_some_and(|host| whitelist.iter().any(|h| *h == host));
            if whitelisted {
                continue;
            }
        }
        if !mirror_normalized.contains(mrk) {
            log_decision!(id, "UPDATE", field = %field.to_mrk());
            diff.take_tags.insert(field.tag.clone());
        }
    }

    let source_signatures: Vec<String> = source_fields.iter().map(Field::signature).collect();
    for (field, mrk) in mirror_fields.iter().zip(&mirror_normalized) {
        if field.tag == "856"
            && field
                .get_value('u')
                .is_some_and(|u| u.contains(mirror_file_host))
        {
            continue;
        }
        if source_normalized.contains(mrk) {
            continue;
        }

        if source_signatures.contains(&field.signature()) {
            log_decision!(id, "SUPERSEDED", field = %field.to_mrk());
            diff.take_tags.insert(field.tag.clone());
        } else {
            log_decision!(id, "TO DELETE", field = %field.to_mrk());
            let mut blanked = field.clone();
            blanked.blank_values();
            diff.delete_fields.push(blanked);
        }
    }

    let mut source_counts: HashMap<&str, usize> = HashMap::new();
    for mrk in &source_mrk {
        *source_counts.entry(mrk.as_str()).or_default() += 1;
    }
    let mut mirror_counts: HashMap<&str, usize> = HashMap::new();
    for mrk in &mirror_mrk {
        *mirror_counts.entry(mrk.as_str()).or_default() += 1;
    }
    for (field, mrk) in mirror_fields.iter().zip(&mirror_mrk) {
        let count = mirror_counts[mrk.as_str()];
        let source_count = source_counts.get(mrk.as_str()).copied().unwrap_or(0);
        if count > 1 && source_count != count && !diff.take_tags.contains(&field.tag) {
            log_decision!(id, "DUPLICATED FIELD", field = %mrk, count = count);
            diff.take_tags.insert(field.tag.clone());
        }
    }

    for field in source.get_fields("856") {
        if field.get_value('3') == Some("Thumbnail") {
            continue;
        }
        let whitelisted = field
            .get_value('u')
            .and_then(url_host)
            .is_some_and(|host| whitelist.iter().any(|h| *h == host));
        if whitelisted {
            continue;
        }
        let missing = field.subfields().iter().any(|s| match &s.value {
            Some(value) => !mirror.get_values("856", s.code).contains(&value.as_str()),
            None => false,
        });
        if missing {
            diff.take_tags.insert("856".to_string());
        }
    }

    diff
}

/// Correction payload: mirror 001, re-taken source fields, blanked deletions, source 998
pub fn build_correction(source: &Record, mirror: &MirrorRecord, diff: &FieldDiff) -> Record {
    let mut correction = Record::new(source.record_type, source.id.value());
    correction.updated = source.updated;

    if let Some(control_number) = mirror.control_value("001") {
        correction.push(Field::control("001", control_number));
    }
    for tag in &diff.take_tags {
        for field in source.get_fields(tag) {
            let mut field = field.clone();
            if let Some(subfields) = field.subfields_mut() {
                subfields.retain(|s| s.value.is_some());
            }
            correction.push(field);
        }
    }
    correction.fields.extend(diff.delete_fields.iter().cloned());
    if let Some(local) = source.get_field("998") {
        correction.push(local.clone());
    }

    correction
}

/// Compares aligned record pairs for one run
pub struct BatchDiffer<'a> {
    ctx: &'a SyncContext,
}

impl<'a> BatchDiffer<'a> {
    pub fn new(ctx: &'a SyncContext) -> Self {
        Self { ctx }
    }

    fn pipeline(&self) -> &TransformPipeline {
        &self.ctx.transform
    }

    /// Diffs a source record against its mirror copy
    pub async fn diff(&self, source: &Record, mirror: &MirrorRecord) -> Result<DiffOutcome> {
        let mut source = source.clone();
        clean_values(&mut source);

        if mirror.get_field("980").is_none() {
            log_decision!(source.id, "MISSING 980");
            return Ok(DiffOutcome::WholeUpdate {
                reason: "MISSING 980".to_string(),
            });
        }

        let diff = compare_fields(
            &source,
            mirror,
            self.pipeline().file_host_whitelist(),
            &self.ctx.settings.mirror_file_host,
        );

        if let Some(reason) = self.file_drift(&source, mirror).await? {
            log_decision!(source.id, "WHOLE UPDATE", reason = %reason);
            return Ok(DiffOutcome::WholeUpdate { reason });
        }

        if diff.is_empty() {
            return Ok(DiffOutcome::Converged);
        }
        Ok(DiffOutcome::Correction(build_correction(&source, mirror, &diff)))
    }

    /// Finds a file the mirror should hold but does not
    async fn file_drift(&self, source: &Record, mirror: &MirrorRecord) -> Result<Option<String>> {
        let mirror_host = self.ctx.settings.mirror_file_host.as_str();
        let mirror_urls = mirror.get_values("856", 'u');

        for field in source.get_fields("856") {
            if field.get_value('3') == Some("Thumbnail") {
                continue;
            }
            let Some(url) = field.get_value('u') else {
                continue;
            };
            let whitelisted = url_host(url).is_some_and(|h| self.pipeline().is_whitelisted(&h));
            if !whitelisted {
                continue;
            }

            if !mirror_urls.iter().any(|u| u.contains(mirror_host)) {
                return Ok(Some(format!("FILE NOT FOUND {url}")));
            }
            if !mirror_has_file(&mirror_urls, last_segment(url)) {
                return Ok(Some(format!("FILE NOT FOUND {url}")));
            }
        }

        let files = self.ctx.stores.files.as_ref();
        for uri in source.get_values("561", 'u') {
            if files.find_by_uri(uri).await?.is_some()
                && !mirror_has_file(&mirror_urls, last_segment(uri))
            {
                return Ok(Some(format!("FILE NOT FOUND {uri}")));
            }
        }

        if source.record_type != RecordType::Bib {
            return Ok(None);
        }

        let resolution = source.get_values("091", 'a').contains(&"RES");
        for symbol in document_symbols(source) {
            for language in Language::ALL {
                let Some(file) = files.latest_by_symbol_language(symbol, language).await? else {
                    continue;
                };

                let pattern = Regex::new(&format!(r"{}\.\w+$", language.code()))
                    .map_err(|e| SyncError::Other(e.to_string()))?;
                let mirror_file = mirror.get_fields("856").find(|f| {
                    f.get_value('u').is_some_and(|u| pattern.is_match(u))
                });

                match mirror_file {
                    Some(field) => {
                        let size = field
                            .get_value('s')
                            .and_then(|s| s.trim().parse::<u64>().ok())
                            .unwrap_or(0);
                        if size != file.size {
                            log_decision!(
                                source.id,
                                "FILE SIZE NOT MATCHING",
                                symbol = symbol,
                                language = %language
                            );
                            return Ok(Some(format!(
                                "FILE SIZE NOT MATCHING - {symbol}-{language}"
                            )));
                        }
                    }
                    None if !resolution && !self.pipeline().is_blacklisted(symbol) => {
                        return Ok(Some(format!("FILE NOT FOUND - {symbol}-{language}")));
                    }
                    None => {}
                }
            }
        }

        Ok(None)
    }
}
