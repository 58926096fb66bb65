//! Durable sync state: export log, queue, callbacks and alert history

use super::ids::{ExportId, RecordId, SourceName};
use super::record::{Collection, RecordType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of change a submission carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExportType {
    New,
    Update,
    Delete,
}

impl ExportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportType::New => "NEW",
            ExportType::Update => "UPDATE",
            ExportType::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ExportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(ExportType::New),
            "UPDATE" => Ok(ExportType::Update),
            "DELETE" => Ok(ExportType::Delete),
            other => Err(format!(
                "Invalid export type '{other}'. Must be 'NEW', 'UPDATE' or 'DELETE'"
            )),
        }
    }
}

/// How the mirror should apply a submitted record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitMode {
    /// Replace the whole record (or create it)
    InsertOrReplace,
    /// Apply only the fields carried by the payload
    Correct,
}

impl SubmitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmitMode::InsertOrReplace => "insertorreplace",
            SubmitMode::Correct => "correct",
        }
    }
}

impl fmt::Display for SubmitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insertorreplace" => Ok(SubmitMode::InsertOrReplace),
            "correct" => Ok(SubmitMode::Correct),
            other => Err(format!(
                "Invalid submission mode '{other}'. Must be 'insertorreplace' or 'correct'"
            )),
        }
    }
}

/// One submission attempt, appended whatever the response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportLogEntry {
    /// Start of the run that produced this entry
    pub export_start: DateTime<Utc>,
    pub export_id: ExportId,
    pub export_type: ExportType,
    /// Submission time
    pub time: DateTime<Utc>,
    pub source: SourceName,
    pub record_type: RecordType,
    pub record_id: RecordId,
    /// HTTP status, or 0 when the request never completed
    pub response_code: u16,
    pub response_text: String,
    pub xml: String,
    /// SHA-256 of `xml`, hex encoded
    pub checksum: String,
}

impl ExportLogEntry {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.response_code)
    }
}

/// Correlation payload sent with a submission and echoed back by the callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonce {
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub id: RecordId,
    pub export_id: ExportId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// A record deferred to a later run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub time: DateTime<Utc>,
    pub source: SourceName,
    pub record_type: RecordType,
    pub record_id: RecordId,
}

/// Asynchronous import result reported back by the mirror
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackEntry {
    pub time: DateTime<Utc>,
    pub record_type: RecordType,
    pub record_id: RecordId,
    pub export_id: Option<ExportId>,
    pub success: bool,
    pub message: Option<String>,
}

/// Last alert raised for a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertState {
    pub collection: Collection,
    pub time: DateTime<Utc>,
    pub pending_secs: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("NEW", ExportType::New)]
    #[test_case("UPDATE", ExportType::Update)]
    #[test_case("DELETE", ExportType::Delete)]
    fn test_export_type_parse(input: &str, expected: ExportType) {
        assert_eq!(input.parse::<ExportType>().unwrap(), expected);
        assert_eq!(expected.as_str(), input);
    }

    #[test]
    fn test_invalid_export_type() {
        assert!("new".parse::<ExportType>().is_err());
        assert!("MERGE".parse::<ExportType>().is_err());
    }

    #[test]
    fn test_submit_mode_parse() {
        assert_eq!(
            "insertorreplace".parse::<SubmitMode>().unwrap(),
            SubmitMode::InsertOrReplace
        );
        assert_eq!("correct".parse::<SubmitMode>().unwrap(), SubmitMode::Correct);
        assert!("append".parse::<SubmitMode>().is_err());
    }

    #[test]
    fn test_export_type_serde() {
        let json = serde_json::to_string(&ExportType::Delete).unwrap();
        assert_eq!(json, "\"DELETE\"");
    }

    #[test]
    fn test_nonce_json_shape() {
        let nonce = Nonce {
            record_type: RecordType::Auth,
            id: RecordId::new(12),
            export_id: ExportId::generate(),
            key: None,
        };

        let value: serde_json::Value = serde_json::to_value(&nonce).unwrap();
        assert_eq!(value["type"], "auth");
        assert_eq!(value["id"], 12);
        assert!(value.get("key").is_none());

        let parsed: Nonce = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, nonce);
    }

    #[test]
    fn test_log_entry_success_range() {
        let mut entry = ExportLogEntry {
            export_start: Utc::now(),
            export_id: ExportId::generate(),
            export_type: ExportType::Update,
            time: Utc::now(),
            source: SourceName::new("test").unwrap(),
            record_type: RecordType::Bib,
            record_id: RecordId::new(1),
            response_code: 200,
            response_text: String::new(),
            xml: String::new(),
            checksum: String::new(),
        };
        assert!(entry.is_success());
        entry.response_code = 0;
        assert!(!entry.is_success());
        entry.response_code = 429;
        assert!(!entry.is_success());
    }
}
