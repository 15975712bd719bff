//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the store and resolver
//! traits, allowing the shelf and the reference server to be tested without
//! a network.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use topicshelf_core::testing::{fixtures, MockRecordStore};
//!
//! let store = Arc::new(MockRecordStore::new());
//! store.insert_topic("folder", "A", vec![fixtures::record(1, "10.1/x")]).await;
//! store.set_next_error(StoreError::Timeout).await;
//! ```

mod mock_resolver;
mod mock_store;

pub use mock_resolver::MockResolver;
pub use mock_store::{MockRecordStore, RecordedCall};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::ingest::ResolvedWork;
    use crate::record::{Document, Record};

    /// Create a test record with reasonable defaults.
    pub fn record(seq: u32, doi: &str) -> Record {
        Record {
            seq,
            name: format!("A study of {}", doi),
            year: "2021".to_string(),
            publication: "Journal of Testing".to_string(),
            page_no: "1-10".to_string(),
            summary: None,
            abstract_text: Some("We test things.".to_string()),
            doi: doi.to_string(),
            author: Some("A. Tester".to_string()),
            remarks: String::new(),
            revision: 0,
        }
    }

    /// Metadata the mock resolver returns for a DOI.
    pub fn resolved_work(doi: &str) -> ResolvedWork {
        ResolvedWork {
            doi: doi.to_string(),
            title: Some(format!("A study of {}", doi)),
            year: Some("2021".to_string()),
            publication: Some("Journal of Testing".to_string()),
            pages: Some("1-10".to_string()),
            abstract_text: Some("We test things.".to_string()),
            author: Some("A. Tester".to_string()),
        }
    }

    /// A document whose bytes are the given text.
    pub fn document(filename: &str, text: &str) -> Document {
        Document::new(filename, text.as_bytes().to_vec())
    }
}
