//! Record model
//!
//! Records and mirror records share the same field layout: an ordered list of
//! [`Field`]s, each either a control field or a data field with two indicators
//! and ordered [`Subfield`]s. Accessors live on the [`MarcFields`] trait so both
//! sides of a comparison read the same way.

use super::ids::RecordId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Value of 980$a that marks a deletion tombstone
pub const DELETED_STATUS: &str = "DELETED";

/// Kind of record being synchronized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    /// Bibliographic record
    Bib,
    /// Authority record
    Auth,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Bib => "bib",
            RecordType::Auth => "auth",
        }
    }

    /// Prefix of the mirror-namespaced control number
    pub fn control_prefix(&self) -> &'static str {
        match self {
            RecordType::Bib => "(DHL)",
            RecordType::Auth => "(DHLAUTH)",
        }
    }

    pub fn collection(&self) -> Collection {
        match self {
            RecordType::Bib => Collection::Bibs,
            RecordType::Auth => Collection::Auths,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bib" => Ok(RecordType::Bib),
            "auth" => Ok(RecordType::Auth),
            other => Err(format!("Invalid record type '{other}'. Must be 'bib' or 'auth'")),
        }
    }
}

/// Source collection watched by the staleness monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Bibs,
    Auths,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Bibs, Collection::Auths];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Bibs => "bibs",
            Collection::Auths => "auths",
        }
    }

    pub fn record_type(&self) -> RecordType {
        match self {
            Collection::Bibs => RecordType::Bib,
            Collection::Auths => RecordType::Auth,
        }
    }

    /// Human label used in alert messages
    pub fn label(&self) -> &'static str {
        match self {
            Collection::Bibs => "Bib",
            Collection::Auths => "Auth",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link from a subfield to another record (controlled vocabulary)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordRef {
    pub id: RecordId,
}

impl RecordRef {
    pub fn new(id: u64) -> Self {
        Self {
            id: RecordId::new(id),
        }
    }
}

/// A coded value inside a data field
///
/// A cross-reference subfield whose target could not be resolved carries
/// `value: None` and must never be submitted as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subfield {
    pub code: char,
    pub value: Option<String>,
    pub xref: Option<RecordRef>,
}

impl Subfield {
    pub fn new(code: char, value: impl Into<String>) -> Self {
        Self {
            code,
            value: Some(value.into()),
            xref: None,
        }
    }

    /// Subfield whose value was resolved from another record
    pub fn linked(code: char, value: Option<String>, xref: RecordRef) -> Self {
        Self {
            code,
            value,
            xref: Some(xref),
        }
    }

    pub fn is_unresolved_xref(&self) -> bool {
        self.xref.is_some() && self.value.is_none()
    }
}

/// Content of a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Control(String),
    Data(Vec<Subfield>),
}

/// A tagged field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub tag: String,
    pub ind1: char,
    pub ind2: char,
    pub kind: FieldKind,
}

impl Field {
    pub fn control(tag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ind1: ' ',
            ind2: ' ',
            kind: FieldKind::Control(value.into()),
        }
    }

    pub fn data(tag: impl Into<String>, ind1: char, ind2: char, subfields: Vec<Subfield>) -> Self {
        Self {
            tag: tag.into(),
            ind1,
            ind2,
            kind: FieldKind::Data(subfields),
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self.kind, FieldKind::Control(_))
    }

    pub fn control_value(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Control(value) => Some(value),
            FieldKind::Data(_) => None,
        }
    }

    pub fn subfields(&self) -> &[Subfield] {
        match &self.kind {
            FieldKind::Control(_) => &[],
            FieldKind::Data(subfields) => subfields,
        }
    }

    pub fn subfields_mut(&mut self) -> Option<&mut Vec<Subfield>> {
        match &mut self.kind {
            FieldKind::Control(_) => None,
            FieldKind::Data(subfields) => Some(subfields),
        }
    }

    /// First non-null value for a subfield code
    pub fn get_value(&self, code: char) -> Option<&str> {
        self.subfields()
            .iter()
            .filter(|s| s.code == code)
            .find_map(|s| s.value.as_deref())
    }

    pub fn get_values(&self, code: char) -> Vec<&str> {
        self.subfields()
            .iter()
            .filter(|s| s.code == code)
            .filter_map(|s| s.value.as_deref())
            .collect()
    }

    /// Sets the first subfield with `code`, appending one if absent
    pub fn set_subfield(&mut self, code: char, value: impl Into<String>) {
        if let Some(subfields) = self.subfields_mut() {
            let value = value.into();
            match subfields.iter_mut().find(|s| s.code == code) {
                Some(existing) => {
                    existing.value = Some(value);
                    existing.xref = None;
                }
                None => subfields.push(Subfield::new(code, value)),
            }
        }
    }

    /// Tag plus both indicators, used to match fields across records
    pub fn signature(&self) -> String {
        format!("{}{}{}", self.tag, self.ind1, self.ind2)
    }

    /// Sets every subfield value to the empty string
    ///
    /// The mirror interprets an all-empty field in a correction as a deletion.
    pub fn blank_values(&mut self) {
        if let Some(subfields) = self.subfields_mut() {
            for subfield in subfields.iter_mut() {
                subfield.value = Some(String::new());
                subfield.xref = None;
            }
        }
    }

    /// Canonical line form used for comparisons, e.g. `=245  10$aTitle`
    pub fn to_mrk(&self) -> String {
        match &self.kind {
            FieldKind::Control(value) => format!("={}  {}", self.tag, value),
            FieldKind::Data(subfields) => {
                let mut line = format!(
                    "={}  {}{}",
                    self.tag,
                    mrk_indicator(self.ind1),
                    mrk_indicator(self.ind2)
                );
                for subfield in subfields {
                    if let Some(value) = &subfield.value {
                        line.push('$');
                        line.push(subfield.code);
                        line.push_str(value);
                    }
                }
                line
            }
        }
    }
}

fn mrk_indicator(ind: char) -> char {
    if ind == ' ' {
        '\\'
    } else {
        ind
    }
}

/// Read access shared by source records and mirror records
pub trait MarcFields {
    fn fields(&self) -> &[Field];

    fn get_fields<'a>(&'a self, tag: &'a str) -> Box<dyn Iterator<Item = &'a Field> + 'a> {
        Box::new(self.fields().iter().filter(move |f| f.tag == tag))
    }

    fn get_field(&self, tag: &str) -> Option<&Field> {
        self.fields().iter().find(|f| f.tag == tag)
    }

    fn get_value(&self, tag: &str, code: char) -> Option<&str> {
        self.fields()
            .iter()
            .filter(|f| f.tag == tag)
            .find_map(|f| f.get_value(code))
    }

    fn get_values(&self, tag: &str, code: char) -> Vec<&str> {
        self.fields()
            .iter()
            .filter(|f| f.tag == tag)
            .flat_map(|f| f.get_values(code))
            .collect()
    }

    fn control_value(&self, tag: &str) -> Option<&str> {
        self.fields()
            .iter()
            .filter(|f| f.tag == tag)
            .find_map(|f| f.control_value())
    }

    fn datafields<'a>(&'a self) -> Box<dyn Iterator<Item = &'a Field> + 'a> {
        Box::new(self.fields().iter().filter(|f| !f.is_control()))
    }

    fn is_tombstone(&self) -> bool {
        self.get_values("980", 'a').contains(&DELETED_STATUS)
    }
}

/// A record owned by the source store
///
/// The engine works on in-memory copies and never writes records back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: RecordId,
    pub record_type: RecordType,
    pub fields: Vec<Field>,
    pub updated: Option<DateTime<Utc>>,
    pub user: Option<String>,
}

impl Record {
    pub fn new(record_type: RecordType, id: u64) -> Self {
        Self {
            id: RecordId::new(id),
            record_type,
            fields: Vec::new(),
            updated: None,
            user: None,
        }
    }

    /// Tombstone standing in for a record deleted from the source
    pub fn tombstone(record_type: RecordType, id: RecordId, deleted_at: DateTime<Utc>) -> Self {
        let mut record = Self::new(record_type, id.value());
        record.set("980", 'a', DELETED_STATUS);
        record.updated = Some(deleted_at);
        record
    }

    pub fn with_updated(mut self, updated: DateTime<Utc>) -> Self {
        self.updated = Some(updated);
        self
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn push(&mut self, field: Field) {
        self.fields.push(field);
    }

    pub fn remove_tag(&mut self, tag: &str) {
        self.fields.retain(|f| f.tag != tag);
    }

    /// Sets the first subfield `code` of the first field `tag`, creating the field if needed
    pub fn set(&mut self, tag: &str, code: char, value: impl Into<String>) {
        match self
            .fields
            .iter_mut()
            .find(|f| f.tag == tag && !f.is_control())
        {
            Some(field) => field.set_subfield(code, value),
            None => self
                .fields
                .push(Field::data(tag, ' ', ' ', vec![Subfield::new(code, value)])),
        }
    }

    /// Title prefix marking a record that is still being catalogued
    pub fn is_work_in_progress(&self) -> bool {
        self.get_value("245", 'a')
            .map(|title| {
                let prefix: String = title.chars().take(16).collect();
                prefix.to_lowercase() == "work in progress"
            })
            .unwrap_or(false)
    }

    /// First 1XX field of an authority record
    pub fn heading_field(&self) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| !f.is_control() && f.tag.starts_with('1'))
    }

    /// Expected mirror control number, e.g. `(DHL)123`
    pub fn mirror_control_number(&self) -> String {
        format!("{}{}", self.record_type.control_prefix(), self.id)
    }
}

impl MarcFields for Record {
    fn fields(&self) -> &[Field] {
        &self.fields
    }
}

/// The mirror's copy of a record, as returned by search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRecord {
    /// Source id recovered from the control number field, if any
    pub id: Option<RecordId>,
    pub fields: Vec<Field>,
}

impl MirrorRecord {
    pub fn new(fields: Vec<Field>) -> Self {
        let id = control_number_id(&fields);
        Self { id, fields }
    }

    /// Raw last-modified marker (control field 005)
    pub fn marker(&self) -> Option<&str> {
        self.control_value("005")
    }
}

impl MarcFields for MirrorRecord {
    fn fields(&self) -> &[Field] {
        &self.fields
    }
}

/// Recovers the source id from the first 035$a carrying a `(DHL` prefix
pub fn control_number_id(fields: &[Field]) -> Option<RecordId> {
    fields
        .iter()
        .filter(|f| f.tag == "035")
        .flat_map(|f| f.get_values('a'))
        .find(|v| v.starts_with("(DHL"))
        .and_then(|v| {
            let rest = v
                .strip_prefix("(DHLAUTH)")
                .or_else(|| v.strip_prefix("(DHL)"))?;
            rest.trim().parse::<RecordId>().ok()
        })
}
