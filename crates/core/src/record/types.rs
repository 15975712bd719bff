//! Record types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Value stored for metadata the resolver could not provide.
pub const UNKNOWN_FIELD: &str = "Unknown";

/// One bibliographic entry within a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Ordinal within the topic (1-based, assigned by the store).
    pub seq: u32,
    /// Title.
    pub name: String,
    pub year: String,
    /// Publication venue (journal, proceedings).
    pub publication: String,
    /// Page reference.
    pub page_no: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(
        rename = "abstract",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub abstract_text: Option<String>,
    /// DOI, the cross-topic matching key. Not unique across topics.
    pub doi: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub remarks: String,
    /// Store-assigned version stamp.
    #[serde(default)]
    pub revision: u64,
}

impl Record {
    /// Create a record with the given DOI and every other field unknown.
    pub fn with_doi(seq: u32, doi: impl Into<String>) -> Self {
        Self {
            seq,
            name: UNKNOWN_FIELD.to_string(),
            year: UNKNOWN_FIELD.to_string(),
            publication: UNKNOWN_FIELD.to_string(),
            page_no: UNKNOWN_FIELD.to_string(),
            summary: None,
            abstract_text: None,
            doi: doi.into(),
            author: None,
            remarks: String::new(),
            revision: 0,
        }
    }

    /// Read a mutable field as text. Absent optional fields read as `None`.
    pub fn field(&self, field: RecordField) -> Option<&str> {
        match field {
            RecordField::Name => Some(&self.name),
            RecordField::Year => Some(&self.year),
            RecordField::Publication => Some(&self.publication),
            RecordField::PageNo => Some(&self.page_no),
            RecordField::Summary => self.summary.as_deref(),
            RecordField::Abstract => self.abstract_text.as_deref(),
            RecordField::Doi => Some(&self.doi),
            RecordField::Author => self.author.as_deref(),
            RecordField::Remarks => Some(&self.remarks),
        }
    }

    /// Overwrite a mutable field.
    ///
    /// Setting an optional field to an empty string clears it.
    pub fn set_field(&mut self, field: RecordField, value: impl Into<String>) {
        let value = value.into();
        let optional = |v: String| if v.is_empty() { None } else { Some(v) };
        match field {
            RecordField::Name => self.name = value,
            RecordField::Year => self.year = value,
            RecordField::Publication => self.publication = value,
            RecordField::PageNo => self.page_no = value,
            RecordField::Summary => self.summary = optional(value),
            RecordField::Abstract => self.abstract_text = optional(value),
            RecordField::Doi => self.doi = value,
            RecordField::Author => self.author = optional(value),
            RecordField::Remarks => self.remarks = value,
        }
    }
}

/// The user-editable fields of a record.
///
/// Sequence number and revision are owned by the store and never edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordField {
    Name,
    Year,
    Publication,
    PageNo,
    Summary,
    Abstract,
    Doi,
    Author,
    Remarks,
}

impl RecordField {
    pub const ALL: [RecordField; 9] = [
        RecordField::Name,
        RecordField::Year,
        RecordField::Publication,
        RecordField::PageNo,
        RecordField::Summary,
        RecordField::Abstract,
        RecordField::Doi,
        RecordField::Author,
        RecordField::Remarks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordField::Name => "name",
            RecordField::Year => "year",
            RecordField::Publication => "publication",
            RecordField::PageNo => "page_no",
            RecordField::Summary => "summary",
            RecordField::Abstract => "abstract",
            RecordField::Doi => "doi",
            RecordField::Author => "author",
            RecordField::Remarks => "remarks",
        }
    }
}

impl fmt::Display for RecordField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown record field: {0}")]
pub struct UnknownFieldError(pub String);

impl FromStr for RecordField {
    type Err = UnknownFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordField::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| UnknownFieldError(s.to_string()))
    }
}

/// Acknowledgement of a successful write or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ack {
    /// New revision of the written record. `None` for deletes and topic
    /// creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
}

impl Ack {
    pub fn empty() -> Self {
        Self { revision: None }
    }

    pub fn with_revision(revision: u64) -> Self {
        Self {
            revision: Some(revision),
        }
    }
}

/// A binary document submitted for record extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_doi_defaults_unknown() {
        let record = Record::with_doi(3, "10.1/x");
        assert_eq!(record.seq, 3);
        assert_eq!(record.doi, "10.1/x");
        assert_eq!(record.name, "Unknown");
        assert_eq!(record.publication, "Unknown");
        assert!(record.remarks.is_empty());
        assert!(record.summary.is_none());
    }

    #[test]
    fn test_set_field_optional_clears_on_empty() {
        let mut record = Record::with_doi(1, "10.1/x");
        record.set_field(RecordField::Author, "Ada Lovelace");
        assert_eq!(record.field(RecordField::Author), Some("Ada Lovelace"));

        record.set_field(RecordField::Author, "");
        assert_eq!(record.author, None);
    }

    #[test]
    fn test_set_field_required() {
        let mut record = Record::with_doi(1, "10.1/x");
        record.set_field(RecordField::Remarks, "read twice");
        record.set_field(RecordField::Year, "1843");
        assert_eq!(record.remarks, "read twice");
        assert_eq!(record.field(RecordField::Year), Some("1843"));
    }

    #[test]
    fn test_field_from_str() {
        assert_eq!("page_no".parse::<RecordField>().unwrap(), RecordField::PageNo);
        assert_eq!("abstract".parse::<RecordField>().unwrap(), RecordField::Abstract);
        assert!("sl_no".parse::<RecordField>().is_err());
    }

    #[test]
    fn test_record_serializes_abstract_key() {
        let mut record = Record::with_doi(1, "10.1/x");
        record.abstract_text = Some("We show".to_string());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["abstract"], "We show");
        assert!(json.get("summary").is_none());

        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_record_deserializes_without_revision() {
        let json = serde_json::json!({
            "seq": 1,
            "name": "Paper",
            "year": "2020",
            "publication": "Journal",
            "page_no": "1-2",
            "doi": "10.1/y"
        });
        let record: Record = serde_json::from_value(json).unwrap();
        assert_eq!(record.revision, 0);
        assert!(record.remarks.is_empty());
    }
}
