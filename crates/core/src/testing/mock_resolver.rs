//! Mock DOI resolver for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::ingest::{ResolveError, ResolvedWork, Resolver};

use super::fixtures;

/// Mock implementation of the Resolver trait.
///
/// Every DOI resolves to `fixtures::resolved_work` unless configured
/// otherwise with `set_work`, `mark_unknown` or `fail_on`.
#[derive(Debug, Default)]
pub struct MockResolver {
    works: Arc<RwLock<HashMap<String, ResolvedWork>>>,
    unknown: Arc<RwLock<HashSet<String>>>,
    failing: Arc<RwLock<HashSet<String>>>,
    /// DOIs passed to `resolve`, in call order.
    resolved: Arc<RwLock<Vec<String>>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return this work for its DOI.
    pub async fn set_work(&self, work: ResolvedWork) {
        self.works.write().await.insert(work.doi.clone(), work);
    }

    /// Return this work when `doi` is requested, whatever DOI the work carries.
    pub async fn set_work_for(&self, doi: &str, work: ResolvedWork) {
        self.works.write().await.insert(doi.to_string(), work);
    }

    /// Report the DOI as unknown (`Ok(None)`).
    pub async fn mark_unknown(&self, doi: &str) {
        self.unknown.write().await.insert(doi.to_string());
    }

    /// Fail resolution of the DOI with a server error.
    pub async fn fail_on(&self, doi: &str) {
        self.failing.write().await.insert(doi.to_string());
    }

    pub async fn resolved_dois(&self) -> Vec<String> {
        self.resolved.read().await.clone()
    }
}

#[async_trait]
impl Resolver for MockResolver {
    async fn resolve(&self, doi: &str) -> Result<Option<ResolvedWork>, ResolveError> {
        self.resolved.write().await.push(doi.to_string());

        if self.failing.read().await.contains(doi) {
            return Err(ResolveError::ApiError {
                status: 503,
                message: "resolver unavailable".to_string(),
            });
        }
        if self.unknown.read().await.contains(doi) {
            return Ok(None);
        }

        let work = self
            .works
            .read()
            .await
            .get(doi)
            .cloned()
            .unwrap_or_else(|| fixtures::resolved_work(doi));
        Ok(Some(work))
    }
}
