//! Stored record filters
//!
//! A filter is a conjunction of exact-value field conditions. It can be read
//! from a JSON document (`--query`) or from the compact query string syntax
//! `191__a:A/RES/1 AND 245__a:Title` (`--querystring`), where `_` in an
//! indicator position matches any indicator.

use super::record::MarcFields;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCondition {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ind1: Option<char>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ind2: Option<char>,
    /// Subfield code; `None` targets a control field value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<char>,
    pub value: String,
}

impl FieldCondition {
    fn matches<R: MarcFields + ?Sized>(&self, record: &R) -> bool {
        record
            .fields()
            .iter()
            .filter(|f| f.tag == self.tag)
            .filter(|f| self.ind1.map_or(true, |i| f.ind1 == i))
            .filter(|f| self.ind2.map_or(true, |i| f.ind2 == i))
            .any(|f| match self.code {
                Some(code) => f.get_values(code).contains(&self.value.as_str()),
                None => f.control_value() == Some(self.value.as_str()),
            })
    }
}

/// Conjunction of field conditions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordFilter {
    pub conditions: Vec<FieldCondition>,
}

impl RecordFilter {
    /// Parses a JSON array of conditions
    pub fn from_json(json: &str) -> Result<Self, String> {
        let filter: RecordFilter =
            serde_json::from_str(json).map_err(|e| format!("Invalid query document: {e}"))?;
        if filter.conditions.is_empty() {
            return Err("Query document has no conditions".to_string());
        }
        Ok(filter)
    }

    /// Parses `TAG[ind1ind2][code]:value` terms joined by ` AND `
    pub fn from_querystring(query: &str) -> Result<Self, String> {
        let mut conditions = Vec::new();
        for term in query.split(" AND ") {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }
            let (key, value) = term
                .split_once(':')
                .ok_or_else(|| format!("Query term '{term}' is missing ':'"))?;
            let chars: Vec<char> = key.chars().collect();
            if !(chars.len() == 3 || chars.len() == 6) || !chars[..3].iter().all(|c| c.is_ascii_alphanumeric()) {
                return Err(format!(
                    "Query term '{term}' must start with a 3 character tag, optionally followed by two indicators and a subfield code"
                ));
            }
            let wildcard = |c: char| if c == '_' { None } else { Some(c) };
            let (ind1, ind2, code) = if chars.len() == 6 {
                (wildcard(chars[3]), wildcard(chars[4]), Some(chars[5]))
            } else {
                (None, None, None)
            };
            conditions.push(FieldCondition {
                tag: chars[..3].iter().collect(),
                ind1,
                ind2,
                code,
                value: value.trim().to_string(),
            });
        }
        if conditions.is_empty() {
            return Err("Query string is empty".to_string());
        }
        Ok(Self { conditions })
    }

    pub fn matches<R: MarcFields + ?Sized>(&self, record: &R) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::{Field, Record, RecordType, Subfield};

    fn resolution() -> Record {
        Record::new(RecordType::Bib, 1)
            .with_field(Field::control("008", "800101"))
            .with_field(Field::data("191", ' ', ' ', vec![Subfield::new('a', "A/RES/1")]))
            .with_field(Field::data("245", '1', '0', vec![Subfield::new('a', "Peace")]))
    }

    #[test]
    fn test_querystring_parse_and_match() {
        let filter = RecordFilter::from_querystring("191__a:A/RES/1 AND 245__a:Peace").unwrap();
        assert_eq!(filter.conditions.len(), 2);
        assert_eq!(filter.conditions[0].ind1, None);
        assert!(filter.matches(&resolution()));

        let miss = RecordFilter::from_querystring("245__a:War").unwrap();
        assert!(!miss.matches(&resolution()));
    }

    #[test]
    fn test_querystring_indicators_and_control() {
        assert!(RecordFilter::from_querystring("24510a:Peace")
            .unwrap()
            .matches(&resolution()));
        assert!(!RecordFilter::from_querystring("24500a:Peace")
            .unwrap()
            .matches(&resolution()));
        assert!(RecordFilter::from_querystring("008:800101")
            .unwrap()
            .matches(&resolution()));
    }

    #[test]
    fn test_querystring_errors() {
        assert!(RecordFilter::from_querystring("").is_err());
        assert!(RecordFilter::from_querystring("191__a").is_err());
        assert!(RecordFilter::from_querystring("19a:x").is_ok());
        assert!(RecordFilter::from_querystring("1910:x").is_err());
    }

    #[test]
    fn test_json_filter() {
        let filter =
            RecordFilter::from_json(r#"[{"tag": "191", "code": "a", "value": "A/RES/1"}]"#).unwrap();
        assert!(filter.matches(&resolution()));
        assert!(RecordFilter::from_json("[]").is_err());
        assert!(RecordFilter::from_json("{").is_err());
    }
}
