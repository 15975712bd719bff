//! Mock record store for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::record::{Ack, Document, Record};
use crate::store::{RecordStore, StoreError};

use super::fixtures;

/// A recorded store call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub operation: &'static str,
    pub owner: String,
    pub topic: Option<String>,
}

type TopicKey = (String, String);

/// Mock implementation of the RecordStore trait.
///
/// Provides controllable behavior for testing:
/// - In-memory topics and records with revision checks
/// - Track calls for assertions
/// - Simulate failures, delays and requests that never complete
///
/// # Example
///
/// ```rust,ignore
/// use topicshelf_core::testing::{MockRecordStore, fixtures};
///
/// let store = MockRecordStore::new();
/// store.insert_topic("folder", "A", vec![fixtures::record(1, "10.1/x")]).await;
///
/// let records = store.list_records("folder", "A").await?;
/// assert_eq!(records.len(), 1);
/// assert_eq!(store.call_count("list_records").await, 1);
/// ```
pub struct MockRecordStore {
    /// Topics in creation order.
    topics: Arc<RwLock<Vec<TopicKey>>>,
    records: Arc<RwLock<HashMap<TopicKey, Vec<Record>>>>,
    next_revision: Arc<AtomicU64>,
    calls: Arc<RwLock<Vec<RecordedCall>>>,
    /// If set, the next call will fail with this error.
    next_error: Arc<RwLock<Option<StoreError>>>,
    /// Topics whose record listing fails.
    failing_topics: Arc<RwLock<HashSet<String>>>,
    /// Operations that never complete.
    hanging: Arc<RwLock<HashSet<&'static str>>>,
    delay: Arc<RwLock<Option<Duration>>>,
    operation_delays: Arc<RwLock<HashMap<&'static str, Duration>>>,
    /// Delay between applying a write and returning its acknowledgement.
    ack_delays: Arc<RwLock<HashMap<&'static str, Duration>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl std::fmt::Debug for MockRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRecordStore")
            .field("records", &"<records>")
            .field("calls", &"<calls>")
            .field("next_error", &"<next_error>")
            .finish()
    }
}

impl Default for MockRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRecordStore {
    /// Create a new empty mock store.
    pub fn new() -> Self {
        Self {
            topics: Arc::new(RwLock::new(Vec::new())),
            records: Arc::new(RwLock::new(HashMap::new())),
            next_revision: Arc::new(AtomicU64::new(1)),
            calls: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            failing_topics: Arc::new(RwLock::new(HashSet::new())),
            hanging: Arc::new(RwLock::new(HashSet::new())),
            delay: Arc::new(RwLock::new(None)),
            operation_delays: Arc::new(RwLock::new(HashMap::new())),
            ack_delays: Arc::new(RwLock::new(HashMap::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn allocate_revision(&self) -> u64 {
        self.next_revision.fetch_add(1, Ordering::SeqCst)
    }

    /// Seed a topic with records. Each record gets a fresh revision.
    pub async fn insert_topic(&self, owner: &str, topic: &str, records: Vec<Record>) {
        let key = (owner.to_string(), topic.to_string());
        let records = records
            .into_iter()
            .map(|mut r| {
                r.revision = self.allocate_revision();
                r
            })
            .collect();

        let mut topics = self.topics.write().await;
        if !topics.contains(&key) {
            topics.push(key.clone());
        }
        self.records.write().await.insert(key, records);
    }

    /// Current stored records of a topic.
    pub async fn stored_records(&self, owner: &str, topic: &str) -> Vec<Record> {
        self.records
            .read()
            .await
            .get(&(owner.to_string(), topic.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Overwrite one stored record behind the client's back, bumping its
    /// revision as a concurrent editor would.
    pub async fn touch_record(&self, owner: &str, topic: &str, seq: u32) {
        let revision = self.allocate_revision();
        let mut records = self.records.write().await;
        if let Some(record) = records
            .get_mut(&(owner.to_string(), topic.to_string()))
            .and_then(|rs| rs.iter_mut().find(|r| r.seq == seq))
        {
            record.revision = revision;
        }
    }

    /// Get recorded calls.
    pub async fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    /// Number of calls made for an operation.
    pub async fn call_count(&self, operation: &str) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Clear recorded calls.
    pub async fn clear_recorded(&self) {
        self.calls.write().await.clear();
    }

    /// Configure the next call to fail with the given error.
    pub async fn set_next_error(&self, error: StoreError) {
        *self.next_error.write().await = Some(error);
    }

    /// Make record listing fail for a topic until cleared.
    pub async fn fail_topic(&self, topic: &str) {
        self.failing_topics.write().await.insert(topic.to_string());
    }

    pub async fn clear_failures(&self) {
        self.failing_topics.write().await.clear();
        *self.next_error.write().await = None;
    }

    /// Make an operation hang forever, as if its response never arrived.
    pub async fn hang(&self, operation: &'static str) {
        self.hanging.write().await.insert(operation);
    }

    /// Delay every call by the given duration.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// Delay one operation, overriding `set_delay` for it.
    pub async fn set_operation_delay(&self, operation: &'static str, delay: Duration) {
        self.operation_delays.write().await.insert(operation, delay);
    }

    /// Apply the operation at once but hold back its acknowledgement.
    pub async fn set_ack_delay(&self, operation: &'static str, delay: Duration) {
        self.ack_delays.write().await.insert(operation, delay);
    }

    async fn acknowledge(&self, operation: &'static str, ack: Ack) -> Result<Ack, StoreError> {
        let delay = self.ack_delays.read().await.get(operation).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(ack)
    }

    /// Highest number of calls that were in progress at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Common preamble of every call: record it, apply delay and injected
    /// failures.
    async fn enter(
        &self,
        operation: &'static str,
        owner: &str,
        topic: Option<&str>,
    ) -> Result<(), StoreError> {
        self.calls.write().await.push(RecordedCall {
            operation,
            owner: owner.to_string(),
            topic: topic.map(str::to_string),
        });

        if self.hanging.read().await.contains(operation) {
            std::future::pending::<()>().await;
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let delay = match self.operation_delays.read().await.get(operation) {
            Some(delay) => Some(*delay),
            None => *self.delay.read().await,
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        Ok(())
    }

    async fn append_dois(
        &self,
        owner: &str,
        topic: &str,
        dois: Vec<String>,
    ) -> Result<Vec<Record>, StoreError> {
        let key = (owner.to_string(), topic.to_string());
        {
            let mut topics = self.topics.write().await;
            if !topics.contains(&key) {
                topics.push(key.clone());
            }
        }

        let mut all = self.records.write().await;
        let records = all.entry(key).or_default();
        let mut seen: HashSet<String> = records.iter().map(|r| r.doi.clone()).collect();
        let mut created = Vec::new();

        for doi in dois {
            if !seen.insert(doi.clone()) {
                continue;
            }
            let mut record = fixtures::record(records.len() as u32 + 1, &doi);
            record.revision = self.allocate_revision();
            records.push(record.clone());
            created.push(record);
        }

        Ok(created)
    }
}

#[async_trait]
impl RecordStore for MockRecordStore {
    async fn list_topics(&self, owner: &str) -> Result<Vec<String>, StoreError> {
        self.enter("list_topics", owner, None).await?;
        Ok(self
            .topics
            .read()
            .await
            .iter()
            .filter(|(o, _)| o == owner)
            .map(|(_, t)| t.clone())
            .collect())
    }

    async fn create_topic(&self, owner: &str, topic: &str) -> Result<Ack, StoreError> {
        self.enter("create_topic", owner, Some(topic)).await?;
        let key = (owner.to_string(), topic.to_string());
        let mut topics = self.topics.write().await;
        if topics.contains(&key) {
            return Err(StoreError::Conflict(format!(
                "Topic '{}' already exists",
                topic
            )));
        }
        topics.push(key.clone());
        self.records.write().await.insert(key, Vec::new());
        Ok(Ack::empty())
    }

    async fn list_records(&self, owner: &str, topic: &str) -> Result<Vec<Record>, StoreError> {
        self.enter("list_records", owner, Some(topic)).await?;
        if self.failing_topics.read().await.contains(topic) {
            return Err(StoreError::ApiError {
                status: 500,
                message: format!("listing '{}' failed", topic),
            });
        }
        Ok(self.stored_records(owner, topic).await)
    }

    async fn append_from_documents(
        &self,
        owner: &str,
        topic: &str,
        documents: Vec<Document>,
    ) -> Result<Vec<Record>, StoreError> {
        self.enter("append_from_documents", owner, Some(topic))
            .await?;
        let dois = documents
            .iter()
            .filter_map(|d| crate::ingest::extract_doi(&String::from_utf8_lossy(&d.bytes)))
            .collect();
        self.append_dois(owner, topic, dois).await
    }

    async fn append_from_keys(
        &self,
        owner: &str,
        topic: &str,
        keys: &[String],
    ) -> Result<Vec<Record>, StoreError> {
        self.enter("append_from_keys", owner, Some(topic)).await?;
        self.append_dois(owner, topic, keys.to_vec()).await
    }

    async fn update_record(
        &self,
        owner: &str,
        topic: &str,
        record: &Record,
    ) -> Result<Ack, StoreError> {
        self.enter("update_record", owner, Some(topic)).await?;
        let revision = self.allocate_revision();
        let mut all = self.records.write().await;
        let stored = all
            .get_mut(&(owner.to_string(), topic.to_string()))
            .and_then(|rs| rs.iter_mut().find(|r| r.seq == record.seq))
            .ok_or_else(|| StoreError::NotFound(format!("Record {}", record.seq)))?;

        if stored.revision != record.revision {
            return Err(StoreError::Conflict(format!(
                "Record {} is at revision {}",
                record.seq, stored.revision
            )));
        }

        *stored = record.clone();
        stored.revision = revision;
        drop(all);
        self.acknowledge("update_record", Ack::with_revision(revision)).await
    }

    async fn delete_record(
        &self,
        owner: &str,
        topic: &str,
        seq: u32,
        revision: u64,
    ) -> Result<Ack, StoreError> {
        self.enter("delete_record", owner, Some(topic)).await?;
        let mut all = self.records.write().await;
        let records = all
            .get_mut(&(owner.to_string(), topic.to_string()))
            .ok_or_else(|| StoreError::NotFound(format!("Topic '{}'", topic)))?;
        let position = records
            .iter()
            .position(|r| r.seq == seq)
            .ok_or_else(|| StoreError::NotFound(format!("Record {}", seq)))?;

        if records[position].revision != revision {
            return Err(StoreError::Conflict(format!(
                "Record {} is at revision {}",
                seq, records[position].revision
            )));
        }

        records.remove(position);
        for record in records.iter_mut().filter(|r| r.seq > seq) {
            record.seq -= 1;
        }
        drop(all);
        self.acknowledge("delete_record", Ack::empty()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_store_records_calls() {
        let store = MockRecordStore::new();
        store.list_topics("f").await.unwrap();
        store.list_records("f", "A").await.unwrap();

        let calls = store.recorded_calls().await;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].topic.as_deref(), Some("A"));
        assert_eq!(store.call_count("list_records").await, 1);
    }

    #[tokio::test]
    async fn test_mock_store_next_error_is_consumed() {
        let store = MockRecordStore::new();
        store.set_next_error(StoreError::Timeout).await;
        assert!(matches!(
            store.list_topics("f").await,
            Err(StoreError::Timeout)
        ));
        assert!(store.list_topics("f").await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_store_revision_check() {
        let store = MockRecordStore::new();
        store
            .insert_topic("f", "A", vec![fixtures::record(1, "10.1/a")])
            .await;
        let record = store.stored_records("f", "A").await.remove(0);

        store.update_record("f", "A", &record).await.unwrap();
        let err = store.update_record("f", "A", &record).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
