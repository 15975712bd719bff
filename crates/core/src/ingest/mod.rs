//! Record ingestion: turning DOIs and documents into records.
//!
//! The store resolves DOIs through a `Resolver`. `DoiOrgResolver` uses
//! content negotiation against doi.org; tests use `testing::MockResolver`.

mod doi;
mod doi_org;

pub use doi::{extract_doi, parse_keys};
pub use doi_org::DoiOrgResolver;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::{Record, UNKNOWN_FIELD};

/// Errors that can occur while resolving a DOI.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Resolver returned an unexpected status.
    #[error("Resolver error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

/// Bibliographic metadata for one DOI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedWork {
    pub doi: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl ResolvedWork {
    /// Build the record stored for this work. Missing metadata becomes
    /// `"Unknown"`.
    pub fn into_record(self, seq: u32, revision: u64) -> Record {
        let or_unknown = |v: Option<String>| v.unwrap_or_else(|| UNKNOWN_FIELD.to_string());
        Record {
            seq,
            name: or_unknown(self.title),
            year: or_unknown(self.year),
            publication: or_unknown(self.publication),
            page_no: or_unknown(self.pages),
            summary: None,
            abstract_text: self.abstract_text,
            doi: self.doi,
            author: self.author,
            remarks: String::new(),
            revision,
        }
    }
}

/// Trait for DOI metadata resolvers.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve a DOI. Returns `Ok(None)` when the DOI is unknown.
    async fn resolve(&self, doi: &str) -> Result<Option<ResolvedWork>, ResolveError>;
}
