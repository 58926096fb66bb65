//! PostgreSQL document models
//!
//! Record fields are stored as a JSONB array. Control fields carry `value`;
//! data fields carry indicators and `subfields`, where a linked subfield keeps
//! the target id in `xref`.

use crate::domain::context::ResultExt;
use crate::domain::{
    AlertState, CallbackEntry, Collection, ExportId, ExportLogEntry, Field, FieldKind, Language,
    Record, RecordFilter, RecordId, RecordRef, Result, SourceName,
    StoredFile, Subfield, SyncError,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_postgres::Row;
use uuid::Uuid;

/// One entry of the `records.fields` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredField {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ind1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ind2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subfields: Option<Vec<StoredSubfield>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSubfield {
    pub code: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xref: Option<u64>,
}

fn first_char(value: &Option<String>) -> char {
    value
        .as_deref()
        .and_then(|s| s.chars().next())
        .unwrap_or(' ')
}

impl From<&Field> for StoredField {
    fn from(field: &Field) -> Self {
        match &field.kind {
            FieldKind::Control(value) => Self {
                tag: field.tag.clone(),
                ind1: None,
                ind2: None,
                value: Some(value.clone()),
                subfields: None,
            },
            FieldKind::Data(subfields) => Self {
                tag: field.tag.clone(),
                ind1: Some(field.ind1.to_string()),
                ind2: Some(field.ind2.to_string()),
                value: None,
                subfields: Some(
                    subfields
                        .iter()
                        .map(|s| StoredSubfield {
                            code: s.code.to_string(),
                            value: s.value.clone(),
                            xref: s.xref.map(|x| x.id.value()),
                        })
                        .collect(),
                ),
            },
        }
    }
}

impl TryFrom<StoredField> for Field {
    type Error = SyncError;

    fn try_from(stored: StoredField) -> Result<Self> {
        match stored.subfields {
            None => Ok(Field::control(
                stored.tag,
                stored.value.unwrap_or_default(),
            )),
            Some(subfields) => {
                let subfields = subfields
                    .into_iter()
                    .map(|s| {
                        let code = s.code.chars().next().ok_or_else(|| {
                            SyncError::Serialization(format!(
                                "Empty subfield code in field {}",
                                stored.tag
                            ))
                        })?;
                        Ok(match s.xref {
                            Some(id) => Subfield::linked(code, s.value, RecordRef::new(id)),
                            None => Subfield {
                                code,
                                value: s.value,
                                xref: None,
                            },
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Field::data(
                    stored.tag.clone(),
                    first_char(&stored.ind1),
                    first_char(&stored.ind2),
                    subfields,
                ))
            }
        }
    }
}

/// Serializes fields for the `fields` column
pub fn fields_to_json(fields: &[Field]) -> Result<Value> {
    let stored: Vec<StoredField> = fields.iter().map(StoredField::from).collect();
    Ok(serde_json::to_value(stored)?)
}

pub fn fields_from_json(value: Value) -> Result<Vec<Field>> {
    let stored: Vec<StoredField> = serde_json::from_value(value)?;
    stored.into_iter().map(Field::try_from).collect()
}

/// JSONB containment documents, one per filter condition
pub fn filter_documents(filter: &RecordFilter) -> Vec<Value> {
    filter
        .conditions
        .iter()
        .map(|c| {
            let mut field = serde_json::Map::new();
            field.insert("tag".to_string(), json!(c.tag));
            if let Some(ind1) = c.ind1 {
                field.insert("ind1".to_string(), json!(ind1.to_string()));
            }
            if let Some(ind2) = c.ind2 {
                field.insert("ind2".to_string(), json!(ind2.to_string()));
            }
            match c.code {
                Some(code) => {
                    field.insert(
                        "subfields".to_string(),
                        json!([{ "code": code.to_string(), "value": c.value }]),
                    );
                }
                None => {
                    field.insert("value".to_string(), json!(c.value));
                }
            }
            Value::Array(vec![Value::Object(field)])
        })
        .collect()
}

/// Containment document matching a bib record by document symbol
pub fn symbol_document(symbol: &str) -> Value {
    json!([{ "tag": "191", "subfields": [{ "code": "a", "value": symbol }] }])
}

fn parse_column<T: std::str::FromStr<Err = String>>(value: &str, column: &str) -> Result<T> {
    value
        .parse()
        .map_err(|e| SyncError::Database(format!("Invalid {column} '{value}': {e}")))
}

fn record_id(value: i64) -> Result<RecordId> {
    u64::try_from(value)
        .map(RecordId::new)
        .map_err(|_| SyncError::Database(format!("Negative record id {value}")))
}

pub fn id_param(id: RecordId) -> i64 {
    id.value() as i64
}

pub fn record_from_row(row: &Row) -> Result<Record> {
    let record_type: String = row.get("record_type");
    let id: i64 = row.get("id");
    let fields: Value = row.get("fields");

    let id = record_id(id)?;
    Ok(Record {
        id,
        record_type: parse_column(&record_type, "record_type")?,
        fields: fields_from_json(fields)
            .with_context(|| format!("Malformed fields in {record_type} record {id}"))?,
        updated: row.get("updated"),
        user: row.get("updated_by"),
    })
}

pub fn record_id_from_row(row: &Row, column: &str) -> Result<RecordId> {
    record_id(row.get(column))
}

pub fn file_from_row(row: &Row) -> Result<StoredFile> {
    let size: i64 = row.get("size");
    let languages: Vec<String> = row.get("languages");

    Ok(StoredFile {
        uri: row.get("uri"),
        filename: row.get("filename"),
        size: u64::try_from(size).unwrap_or(0),
        languages: languages
            .iter()
            .filter_map(|code| Language::from_code(code))
            .collect(),
        timestamp: row.get("timestamp"),
    })
}

pub fn log_entry_from_row(row: &Row) -> Result<ExportLogEntry> {
    let export_id: Uuid = row.get("export_id");
    let export_type: String = row.get("export_type");
    let source: String = row.get("source");
    let record_type: String = row.get("record_type");
    let response_code: i32 = row.get("response_code");

    Ok(ExportLogEntry {
        export_start: row.get("export_start"),
        export_id: ExportId::from(export_id),
        export_type: parse_column(&export_type, "export_type")?,
        time: row.get("time"),
        source: parse_column::<SourceName>(&source, "source")?,
        record_type: parse_column(&record_type, "record_type")?,
        record_id: record_id_from_row(row, "record_id")?,
        response_code: u16::try_from(response_code).unwrap_or(0),
        response_text: row.get("response_text"),
        xml: row.get("xml"),
        checksum: row.get("checksum"),
    })
}

pub fn callback_from_row(row: &Row) -> Result<CallbackEntry> {
    let record_type: String = row.get("record_type");
    let export_id: Option<Uuid> = row.get("export_id");

    Ok(CallbackEntry {
        time: row.get("time"),
        record_type: parse_column(&record_type, "record_type")?,
        record_id: record_id_from_row(row, "record_id")?,
        export_id: export_id.map(ExportId::from),
        success: row.get("success"),
        message: row.get("message"),
    })
}

pub fn alert_state_from_row(row: &Row, collection: Collection) -> AlertState {
    AlertState {
        collection,
        time: row.get("time"),
        pending_secs: row.get("pending_secs"),
    }
}
