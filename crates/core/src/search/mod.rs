//! Cross-topic DOI search.
//!
//! A search fetches every topic fresh from the store, bounded by
//! `max_concurrent_fetches`, and reports the topics holding a record whose
//! DOI equals the key exactly. Results are never cached between calls and
//! never written into the partition cache.

mod highlight;

pub use highlight::Highlight;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::SearchConfig;
use crate::metrics;
use crate::store::{fetch_partitions, RecordStore, StoreError};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search key cannot be empty")]
    EmptyKey,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Searches every topic for a DOI and drives the highlight.
pub struct SearchEngine {
    store: Arc<dyn RecordStore>,
    highlight: Highlight,
    max_concurrent: usize,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn RecordStore>, config: &SearchConfig) -> Self {
        Self {
            store,
            highlight: Highlight::new(Duration::from_secs(config.highlight_secs)),
            max_concurrent: config.max_concurrent_fetches,
        }
    }

    /// Topics, in the given order, holding a record with `doi == key`.
    ///
    /// A non-empty result replaces the highlight. An empty result or a
    /// failed fetch leaves it untouched.
    pub async fn search(
        &self,
        owner: &str,
        key: &str,
        topics: &[String],
    ) -> Result<Vec<String>, SearchError> {
        if key.is_empty() {
            return Err(SearchError::EmptyKey);
        }

        let fetched =
            fetch_partitions(self.store.as_ref(), owner, topics, self.max_concurrent).await;
        let partitions = match fetched {
            Ok(partitions) => partitions,
            Err(e) => {
                warn!("Search for '{}' aborted: {}", key, e);
                metrics::SEARCHES.with_label_values(&["failed"]).inc();
                return Err(e.into());
            }
        };

        let matches: Vec<String> = partitions
            .into_iter()
            .filter(|(_, records)| records.iter().any(|r| r.doi == key))
            .map(|(topic, _)| topic)
            .collect();

        if matches.is_empty() {
            info!("DOI '{}' not found in {} topic(s)", key, topics.len());
            metrics::SEARCHES.with_label_values(&["not_found"]).inc();
        } else {
            info!("DOI '{}' found in {:?}", key, matches);
            metrics::SEARCHES.with_label_values(&["found"]).inc();
            self.highlight.replace(matches.clone());
        }

        Ok(matches)
    }

    pub fn highlight(&self) -> &Highlight {
        &self.highlight
    }
}
