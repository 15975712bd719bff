//! Remote record store abstraction.
//!
//! This module provides a `RecordStore` trait for reading and writing the
//! records of an owner's topics, with an HTTP client for the remote store
//! and a SQLite implementation that backs the reference server.

mod fanout;
mod http;
mod sqlite;

pub use fanout::fetch_partitions;
pub use http::HttpRecordStore;
pub use sqlite::SqliteRecordStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ingest::ResolveError;
use crate::record::{Ack, Document, Record};

/// Errors that can occur when talking to the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Request did not complete within the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// Target topic or record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Revision mismatch or duplicate topic.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The store rejected the request as malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Store returned an unexpected status.
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Database error: {0}")]
    Database(String),

    /// Metadata resolution failed while ingesting.
    #[error("Resolver error: {0}")]
    Resolve(#[from] ResolveError),
}

impl StoreError {
    /// Whether this is a transport or server failure rather than a rejection
    /// of the request itself.
    pub fn is_remote(&self) -> bool {
        !matches!(
            self,
            StoreError::NotFound(_) | StoreError::Conflict(_) | StoreError::InvalidRequest(_)
        )
    }
}

/// Error body returned by the store on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Response body of the topic listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicList {
    pub topics: Vec<String>,
}

/// Request body for topic creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTopicRequest {
    pub name: String,
}

/// Request body for key ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestKeysRequest {
    pub keys: Vec<String>,
}

/// Trait for record store backends.
///
/// Every operation is scoped to an owner (the opaque folder identifier
/// obtained at sign-in) and, except for topic operations, to a topic.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// List the topic names known for an owner, in creation order.
    async fn list_topics(&self, owner: &str) -> Result<Vec<String>, StoreError>;

    /// Create an empty topic.
    ///
    /// Fails with `Conflict` if the topic already exists.
    async fn create_topic(&self, owner: &str, topic: &str) -> Result<Ack, StoreError>;

    /// List the records of a topic ordered by sequence number.
    ///
    /// A topic that has never been written lists as empty.
    async fn list_records(&self, owner: &str, topic: &str) -> Result<Vec<Record>, StoreError>;

    /// Extract records from documents and append them to the topic.
    ///
    /// All-or-nothing: either every extracted record is appended or none is.
    /// Documents whose DOI already exists in the topic are skipped.
    async fn append_from_documents(
        &self,
        owner: &str,
        topic: &str,
        documents: Vec<Document>,
    ) -> Result<Vec<Record>, StoreError>;

    /// Resolve keys (DOIs) into records and append them to the topic, in key
    /// order. Keys already present in the topic are skipped.
    async fn append_from_keys(
        &self,
        owner: &str,
        topic: &str,
        keys: &[String],
    ) -> Result<Vec<Record>, StoreError>;

    /// Replace the stored record with the same sequence number.
    ///
    /// Fails with `Conflict` if the stored revision differs from
    /// `record.revision`. The returned ack carries the new revision.
    async fn update_record(
        &self,
        owner: &str,
        topic: &str,
        record: &Record,
    ) -> Result<Ack, StoreError>;

    /// Delete a record, then renumber later records so sequence numbers stay
    /// contiguous.
    async fn delete_record(
        &self,
        owner: &str,
        topic: &str,
        seq: u32,
        revision: u64,
    ) -> Result<Ack, StoreError>;
}
