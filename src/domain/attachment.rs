//! Stored file metadata and the language set files are published in

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Languages a document can be stored in, in publication order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    AR,
    ZH,
    EN,
    FR,
    RU,
    ES,
    DE,
}

impl Language {
    pub const ALL: [Language; 7] = [
        Language::AR,
        Language::ZH,
        Language::EN,
        Language::FR,
        Language::RU,
        Language::ES,
        Language::DE,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Language::AR => "AR",
            Language::ZH => "ZH",
            Language::EN => "EN",
            Language::FR => "FR",
            Language::RU => "RU",
            Language::ES => "ES",
            Language::DE => "DE",
        }
    }

    /// Name shown in the mirror's file description
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::AR => "العربية",
            Language::ZH => "中文",
            Language::EN => "English",
            Language::FR => "Français",
            Language::RU => "Русский",
            Language::ES => "Español",
            Language::DE => "Other",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|l| l.code().eq_ignore_ascii_case(code))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A file held by the source's file store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    /// Storage location without scheme, e.g. `bucket.s3.amazonaws.com/abc123`
    pub uri: String,
    pub filename: String,
    /// Size in bytes
    pub size: u64,
    pub languages: Vec<Language>,
    pub timestamp: DateTime<Utc>,
}

impl StoredFile {
    /// Description text listing the file's languages
    pub fn language_names(&self) -> String {
        self.languages
            .iter()
            .map(|l| l.display_name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_order_and_lookup() {
        assert_eq!(Language::ALL[0], Language::AR);
        assert_eq!(Language::ALL[6], Language::DE);
        assert_eq!(Language::from_code("en"), Some(Language::EN));
        assert_eq!(Language::from_code("XX"), None);
    }

    #[test]
    fn test_language_names() {
        let file = StoredFile {
            uri: "bucket/1".to_string(),
            filename: "a.pdf".to_string(),
            size: 10,
            languages: vec![Language::EN, Language::FR],
            timestamp: Utc::now(),
        };
        assert_eq!(file.language_names(), "English, Français");
    }
}
