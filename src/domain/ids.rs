//! Domain identifier types with validation
//!
//! Newtype wrappers for record identifiers, source identities and export ids.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Source-assigned record identifier
///
/// # Examples
///
/// ```
/// use dlsync::domain::ids::RecordId;
/// use std::str::FromStr;
///
/// let id = RecordId::from_str("1234567").unwrap();
/// assert_eq!(id.value(), 1234567);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(u64);

impl RecordId {
    /// Creates a new RecordId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the numeric value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("Record ID cannot be empty".to_string());
        }
        trimmed
            .parse::<u64>()
            .map(Self)
            .map_err(|_| format!("Invalid record ID '{trimmed}': must be a positive integer"))
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Identity of the process writing export log entries
///
/// Gate checks and queue entries are scoped by this name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceName(String);

impl SourceName {
    /// Creates a new SourceName from a string
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("Source name cannot be empty".to_string());
        }
        Ok(Self(name))
    }

    /// Returns the source name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SourceName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for SourceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Unique identifier of a single submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExportId(Uuid);

impl ExportId {
    /// Generates a fresh export id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for ExportId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ExportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_parse() {
        assert_eq!(RecordId::from_str(" 42 ").unwrap(), RecordId::new(42));
        assert!(RecordId::from_str("").is_err());
        assert!(RecordId::from_str("abc").is_err());
        assert!(RecordId::from_str("-1").is_err());
    }

    #[test]
    fn test_record_id_ordering() {
        let mut ids = vec![RecordId::new(3), RecordId::new(1), RecordId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![RecordId::new(1), RecordId::new(2), RecordId::new(3)]);
    }

    #[test]
    fn test_source_name_validation() {
        assert!(SourceName::new("dlsync-lambda").is_ok());
        assert!(SourceName::new("   ").is_err());
    }

    #[test]
    fn test_export_id_unique() {
        assert_ne!(ExportId::generate(), ExportId::generate());
    }

    #[test]
    fn test_record_id_serde_transparent() {
        let json = serde_json::to_string(&RecordId::new(7)).unwrap();
        assert_eq!(json, "7");
    }
}
