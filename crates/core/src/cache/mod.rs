//! Partition cache: the materialized records of each topic.
//!
//! Entries are absent until fetched. Every structural change to a topic
//! (load, append, deletion) gives it a new epoch; edits carry the epoch they
//! started from and are only written back while it is still current.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::debug;

use crate::metrics;
use crate::record::{Record, RecordField};
use crate::store::{fetch_partitions, RecordStore, StoreError};

/// Errors from index-based cache access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("Topic '{0}' is not loaded")]
    NotLoaded(String),

    #[error("Index {index} is out of range for {len} record(s)")]
    IndexOutOfRange { index: usize, len: usize },

    /// The topic changed structurally since the given epoch.
    #[error("Topic '{0}' changed since the edit began")]
    Stale(String),
}

#[derive(Debug, Default)]
struct CacheState {
    partitions: HashMap<String, Vec<Record>>,
    epochs: HashMap<String, u64>,
    /// Source of epochs. Never reset, so an epoch is never reused.
    next_epoch: u64,
}

impl CacheState {
    fn bump(&mut self, topic: &str) {
        self.next_epoch += 1;
        self.epochs.insert(topic.to_string(), self.next_epoch);
    }

    fn epoch(&self, topic: &str) -> u64 {
        self.epochs.get(topic).copied().unwrap_or(0)
    }

    /// Records of `topic`, provided its epoch is still `epoch`.
    fn current_mut(&mut self, topic: &str, epoch: u64) -> Result<&mut Vec<Record>, CacheError> {
        if self.epoch(topic) != epoch {
            return Err(CacheError::Stale(topic.to_string()));
        }
        self.partitions
            .get_mut(topic)
            .ok_or_else(|| CacheError::NotLoaded(topic.to_string()))
    }
}

/// Shared handle to the per-topic record cache.
///
/// Cloning yields another handle to the same cache. The internal lock is
/// only held between awaits, never across a store call.
#[derive(Debug, Clone, Default)]
pub struct PartitionCache {
    state: Arc<Mutex<CacheState>>,
}

impl PartitionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached records of a topic, or `None` if it was never fetched.
    pub fn get(&self, topic: &str) -> Option<Vec<Record>> {
        self.state().partitions.get(topic).cloned()
    }

    /// Current epoch of a topic. Topics never loaded are at epoch 0.
    pub fn epoch(&self, topic: &str) -> u64 {
        self.state().epoch(topic)
    }

    /// Copy of the record at `index` together with the topic's epoch.
    pub fn snapshot(&self, topic: &str, index: usize) -> Result<(Record, u64), CacheError> {
        let state = self.state();
        let records = state
            .partitions
            .get(topic)
            .ok_or_else(|| CacheError::NotLoaded(topic.to_string()))?;
        let record = records.get(index).ok_or(CacheError::IndexOutOfRange {
            index,
            len: records.len(),
        })?;
        Ok((record.clone(), state.epoch(topic)))
    }

    /// Overwrite a topic's records.
    pub fn replace(&self, topic: &str, records: Vec<Record>) {
        let mut state = self.state();
        state.partitions.insert(topic.to_string(), records);
        state.bump(topic);
    }

    /// Fetch a topic and overwrite its cached records.
    ///
    /// On failure the previous entry is left as it was.
    pub async fn load(
        &self,
        store: &dyn RecordStore,
        owner: &str,
        topic: &str,
    ) -> Result<Vec<Record>, StoreError> {
        let records = store.list_records(owner, topic).await?;
        debug!("Loaded {} record(s) for topic '{}'", records.len(), topic);
        metrics::CACHE_LOADS.with_label_values(&["single"]).inc();
        self.replace(topic, records.clone());
        Ok(records)
    }

    /// Fetch every topic and overwrite the cache with the results.
    ///
    /// All-or-nothing: if any fetch fails, no entry is touched.
    pub async fn load_all(
        &self,
        store: &dyn RecordStore,
        owner: &str,
        topics: &[String],
        max_concurrent: usize,
    ) -> Result<Vec<(String, Vec<Record>)>, StoreError> {
        let partitions = fetch_partitions(store, owner, topics, max_concurrent).await?;
        metrics::CACHE_LOADS.with_label_values(&["all"]).inc();

        let mut state = self.state();
        for (topic, records) in &partitions {
            state.partitions.insert(topic.clone(), records.clone());
            state.bump(topic);
        }
        Ok(partitions)
    }

    /// Mutate one field of a cached record in place.
    ///
    /// Not a structural change: the epoch stays the same.
    pub fn apply_local_mutation(
        &self,
        topic: &str,
        epoch: u64,
        index: usize,
        field: RecordField,
        value: &str,
    ) -> Result<(), CacheError> {
        let mut state = self.state();
        let records = state.current_mut(topic, epoch)?;
        let len = records.len();
        let record = records
            .get_mut(index)
            .ok_or(CacheError::IndexOutOfRange { index, len })?;
        record.set_field(field, value);
        Ok(())
    }

    /// Put a whole record back at `index` if the topic is still at `epoch`.
    pub fn write_back(
        &self,
        topic: &str,
        epoch: u64,
        index: usize,
        record: Record,
    ) -> Result<(), CacheError> {
        let mut state = self.state();
        let records = state.current_mut(topic, epoch)?;
        let len = records.len();
        let slot = records
            .get_mut(index)
            .ok_or(CacheError::IndexOutOfRange { index, len })?;
        *slot = record;
        Ok(())
    }

    /// Append newly created records to a loaded topic.
    ///
    /// Topics that were never fetched stay absent; their next load brings the
    /// new records in.
    pub fn apply_append(&self, topic: &str, new_records: &[Record]) {
        let mut state = self.state();
        let Some(records) = state.partitions.get_mut(topic) else {
            return;
        };
        records.extend_from_slice(new_records);
        state.bump(topic);
    }

    /// Remove the record with sequence number `seq` and revision `revision`
    /// after a confirmed delete, shifting later sequence numbers down by one.
    ///
    /// A record at `seq` with another revision is left alone: the topic was
    /// reloaded after the store renumbered it. Returns whether a record was
    /// removed.
    pub fn apply_deletion(&self, topic: &str, seq: u32, revision: u64) -> bool {
        let mut state = self.state();
        let Some(records) = state.partitions.get_mut(topic) else {
            return false;
        };
        let Some(position) = records
            .iter()
            .position(|r| r.seq == seq && r.revision == revision)
        else {
            return false;
        };

        records.remove(position);
        for record in records.iter_mut().filter(|r| r.seq > seq) {
            record.seq -= 1;
        }
        state.bump(topic);
        true
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut state = self.state();
        state.partitions.clear();
        state.epochs.clear();
    }
}
