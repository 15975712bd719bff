//! doi.org resolver using CSL JSON content negotiation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::ResolverConfig;

use super::{ResolveError, ResolvedWork, Resolver};

const CSL_JSON: &str = "application/vnd.citationstyles.csl+json";

/// Resolves DOIs by asking `https://doi.org/{doi}` for CSL JSON.
pub struct DoiOrgResolver {
    client: Client,
    base_url: String,
}

impl DoiOrgResolver {
    pub fn new(config: &ResolverConfig) -> Result<Self, ResolveError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Parse a CSL JSON document into a resolved work.
    pub fn parse_csl(doi: &str, json: &str) -> Result<ResolvedWork, ResolveError> {
        let item: CslItem = serde_json::from_str(json)
            .map_err(|e| ResolveError::ParseError(format!("Invalid CSL JSON: {}", e)))?;
        Ok(item.into_work(doi))
    }
}

#[async_trait]
impl Resolver for DoiOrgResolver {
    async fn resolve(&self, doi: &str) -> Result<Option<ResolvedWork>, ResolveError> {
        let url = format!("{}/{}", self.base_url, doi);
        debug!("Resolving DOI: {}", doi);

        let response = self
            .client
            .get(&url)
            .header(header::ACCEPT, CSL_JSON)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ResolveError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = response.text().await?;
        Self::parse_csl(doi, &body).map(Some)
    }
}

#[derive(Debug, Deserialize)]
struct CslItem {
    title: Option<Value>,
    #[serde(rename = "container-title")]
    container_title: Option<Value>,
    page: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    issued: Option<CslDate>,
    #[serde(default)]
    author: Vec<CslAuthor>,
}

#[derive(Debug, Deserialize)]
struct CslDate {
    #[serde(rename = "date-parts")]
    date_parts: Option<Vec<Vec<Value>>>,
}

#[derive(Debug, Deserialize)]
struct CslAuthor {
    given: Option<String>,
    family: Option<String>,
    literal: Option<String>,
}

/// CSL text fields may be a string or a list of strings.
fn first_text(value: Option<Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => Some(s),
        Value::Array(items) => items.into_iter().find_map(|v| match v {
            Value::String(s) => Some(s),
            _ => None,
        }),
        _ => None,
    };
    text.filter(|s| !s.trim().is_empty())
}

impl CslAuthor {
    fn display(&self) -> Option<String> {
        if let Some(literal) = &self.literal {
            return Some(literal.clone());
        }
        match (&self.given, &self.family) {
            (Some(given), Some(family)) => Some(format!("{} {}", given, family)),
            (None, Some(family)) => Some(family.clone()),
            (Some(given), None) => Some(given.clone()),
            (None, None) => None,
        }
    }
}

impl CslItem {
    fn into_work(self, requested: &str) -> ResolvedWork {
        let year = self
            .issued
            .and_then(|d| d.date_parts)
            .and_then(|parts| parts.into_iter().next())
            .and_then(|parts| parts.into_iter().next())
            .and_then(|y| match y {
                Value::Number(n) => Some(n.to_string()),
                Value::String(s) => Some(s),
                _ => None,
            });

        let authors: Vec<String> = self.author.iter().filter_map(CslAuthor::display).collect();

        ResolvedWork {
            doi: requested.to_string(),
            title: first_text(self.title),
            year,
            publication: first_text(self.container_title),
            pages: self.page,
            abstract_text: self.abstract_text,
            author: if authors.is_empty() {
                None
            } else {
                Some(authors.join(" and "))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csl_full() {
        let json = r#"{
            "DOI": "10.1038/nphys1170",
            "title": "Measured measurement",
            "container-title": "Nature Physics",
            "page": "29-32",
            "issued": {"date-parts": [[2009, 1]]},
            "author": [
                {"given": "Markus", "family": "Aspelmeyer"},
                {"literal": "The Collaboration"}
            ]
        }"#;

        let work = DoiOrgResolver::parse_csl("10.1038/NPHYS1170", json).unwrap();
        assert_eq!(work.doi, "10.1038/NPHYS1170");
        assert_eq!(work.title.as_deref(), Some("Measured measurement"));
        assert_eq!(work.publication.as_deref(), Some("Nature Physics"));
        assert_eq!(work.pages.as_deref(), Some("29-32"));
        assert_eq!(work.year.as_deref(), Some("2009"));
        assert_eq!(
            work.author.as_deref(),
            Some("Markus Aspelmeyer and The Collaboration")
        );
    }

    #[test]
    fn test_parse_csl_list_titles_and_missing_fields() {
        let json = r#"{"title": ["First", "Second"], "container-title": []}"#;
        let work = DoiOrgResolver::parse_csl("10.1/a", json).unwrap();
        assert_eq!(work.doi, "10.1/a");
        assert_eq!(work.title.as_deref(), Some("First"));
        assert_eq!(work.publication, None);
        assert_eq!(work.year, None);
        assert_eq!(work.author, None);
    }

    #[test]
    fn test_parse_csl_invalid() {
        let result = DoiOrgResolver::parse_csl("10.1/a", "<html>");
        assert!(matches!(result, Err(ResolveError::ParseError(_))));
    }
}
