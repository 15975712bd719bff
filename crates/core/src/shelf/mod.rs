//! The shelf: session, topics, cache, edits and search behind one facade.
//!
//! Every user-facing operation returns its result and also publishes a
//! notification, so a failed operation never goes unreported and never
//! takes the session down.
//!
//! No lock is held across a store call. Edits and deletions are reconciled
//! with concurrent structural changes through cache epochs: an edit whose
//! topic changed underneath it fails with `ShelfError::StaleEdit` and the
//! topic has to be reloaded.

mod notify;

pub use notify::{Notification, NotificationLevel, Notifier};

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::cache::{CacheError, PartitionCache};
use crate::config::SearchConfig;
use crate::edit::{EditBuffer, EditEntry, EditError};
use crate::ingest::parse_keys;
use crate::record::{Document, Record, RecordField};
use crate::search::{SearchEngine, SearchError};
use crate::session::{SessionContext, SessionError, SessionStorage};
use crate::store::{RecordStore, StoreError};
use crate::topics::{TopicCatalog, TopicError};

/// Broad error classes shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network or server failure.
    Remote,
    /// Rejected locally before any store call.
    Validation,
    NotFound,
    /// Revision mismatch.
    Conflict,
    /// Client-local session storage failed.
    Storage,
}

#[derive(Debug, Error)]
pub enum ShelfError {
    #[error("Not signed in")]
    NotSignedIn,

    #[error("No topic selected")]
    NoTopicSelected,

    #[error("Nothing to add")]
    EmptyBatch,

    #[error("The topic changed while editing; reload it and try again")]
    StaleEdit,

    #[error(transparent)]
    Topic(#[from] TopicError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

fn store_kind(error: &StoreError) -> ErrorKind {
    match error {
        StoreError::NotFound(_) => ErrorKind::NotFound,
        StoreError::Conflict(_) => ErrorKind::Conflict,
        StoreError::InvalidRequest(_) => ErrorKind::Validation,
        _ => ErrorKind::Remote,
    }
}

impl ShelfError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShelfError::Store(e) => store_kind(e),
            ShelfError::Search(SearchError::Store(e)) => store_kind(e),
            ShelfError::Session(SessionError::Io(_) | SessionError::Serialization(_)) => {
                ErrorKind::Storage
            }
            ShelfError::NotSignedIn
            | ShelfError::NoTopicSelected
            | ShelfError::EmptyBatch
            | ShelfError::StaleEdit
            | ShelfError::Topic(_)
            | ShelfError::Cache(_)
            | ShelfError::Edit(_)
            | ShelfError::Search(SearchError::EmptyKey)
            | ShelfError::Session(_) => ErrorKind::Validation,
        }
    }
}

/// Client-side record manager for one user.
pub struct Shelf {
    store: Arc<dyn RecordStore>,
    storage: Arc<dyn SessionStorage>,
    session: RwLock<Option<SessionContext>>,
    catalog: RwLock<TopicCatalog>,
    cache: PartitionCache,
    edit: RwLock<EditBuffer>,
    search: SearchEngine,
    notifier: Notifier,
    max_concurrent: usize,
}

impl Shelf {
    pub fn new(
        store: Arc<dyn RecordStore>,
        storage: Arc<dyn SessionStorage>,
        config: &SearchConfig,
    ) -> Self {
        Self {
            search: SearchEngine::new(Arc::clone(&store), config),
            store,
            storage,
            session: RwLock::new(None),
            catalog: RwLock::new(TopicCatalog::new()),
            cache: PartitionCache::new(),
            edit: RwLock::new(EditBuffer::new()),
            notifier: Notifier::new(),
            max_concurrent: config.max_concurrent_fetches,
        }
    }

    /// Subscribe to operation notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    fn report<T>(&self, result: Result<T, ShelfError>) -> Result<T, ShelfError> {
        if let Err(e) = &result {
            warn!("Operation failed ({:?}): {}", e.kind(), e);
            self.notifier.error(e.to_string());
        }
        result
    }

    async fn owner(&self) -> Result<String, ShelfError> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.owner.clone())
            .ok_or(ShelfError::NotSignedIn)
    }

    async fn owner_and_topic(&self) -> Result<(String, String), ShelfError> {
        let session = self.session.read().await;
        let session = session.as_ref().ok_or(ShelfError::NotSignedIn)?;
        let topic = session
            .selected_topic
            .clone()
            .ok_or(ShelfError::NoTopicSelected)?;
        Ok((session.owner.clone(), topic))
    }

    // =========================================================================
    // Session
    // =========================================================================

    pub async fn session(&self) -> Option<SessionContext> {
        self.session.read().await.clone()
    }

    pub async fn selected_topic(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .and_then(|s| s.selected_topic.clone())
    }

    /// Resume a persisted session: topics are listed and the selected topic,
    /// if any, is loaded. `None` if nobody is signed in.
    pub async fn restore(&self) -> Result<Option<SessionContext>, ShelfError> {
        let result: Result<_, ShelfError> = async {
            let Some(ctx) = SessionContext::restore(self.storage.as_ref())? else {
                return Ok(None);
            };
            info!("Restoring session for '{}'", ctx.display_name);
            *self.session.write().await = Some(ctx.clone());

            self.fetch_topics(&ctx.owner).await?;
            if let Some(topic) = &ctx.selected_topic {
                self.cache.load(self.store.as_ref(), &ctx.owner, topic).await?;
            }
            Ok(Some(ctx))
        }
        .await;
        self.report(result)
    }

    /// Establish the session from the sign-in redirect and list its topics.
    ///
    /// The session is kept even if listing topics fails.
    pub async fn handle_sign_in(&self, callback: &str) -> Result<SessionContext, ShelfError> {
        let result: Result<_, ShelfError> = async {
            let ctx = SessionContext::from_callback(callback)?;
            self.reset_local_state().await;
            ctx.persist(self.storage.as_ref())?;
            *self.session.write().await = Some(ctx.clone());
            info!("Signed in as '{}'", ctx.display_name);

            self.fetch_topics(&ctx.owner).await?;
            self.notifier
                .success(format!("Signed in as {}", ctx.display_name));
            Ok(ctx)
        }
        .await;
        self.report(result)
    }

    /// Forget the session. In-memory state is dropped even if clearing the
    /// persisted context fails.
    pub async fn logout(&self) -> Result<(), ShelfError> {
        let cleared = self.storage.clear();
        *self.session.write().await = None;
        self.reset_local_state().await;
        info!("Logged out");

        let result = cleared.map_err(ShelfError::from);
        if result.is_ok() {
            self.notifier.info("Logged out");
        }
        self.report(result)
    }

    async fn reset_local_state(&self) {
        self.catalog.write().await.clear();
        self.edit.write().await.take();
        self.cache.clear();
        self.search.highlight().clear();
    }

    // =========================================================================
    // Topics
    // =========================================================================

    pub async fn topics(&self) -> Vec<String> {
        self.catalog.read().await.topics().to_vec()
    }

    async fn fetch_topics(&self, owner: &str) -> Result<Vec<String>, ShelfError> {
        let topics = self.store.list_topics(owner).await?;
        debug!("Owner has {} topic(s)", topics.len());
        let mut catalog = self.catalog.write().await;
        catalog.replace(topics);
        Ok(catalog.topics().to_vec())
    }

    /// Re-fetch the topic list.
    pub async fn refresh_topics(&self) -> Result<Vec<String>, ShelfError> {
        let result: Result<_, ShelfError> = async {
            let owner = self.owner().await?;
            self.fetch_topics(&owner).await
        }
        .await;
        self.report(result)
    }

    /// Create a topic and select it.
    ///
    /// Empty and duplicate names are rejected without contacting the store.
    pub async fn add_topic(&self, name: &str) -> Result<(), ShelfError> {
        let result: Result<_, ShelfError> = async {
            let owner = self.owner().await?;
            self.catalog.read().await.validate_new(name)?;

            self.store.create_topic(&owner, name).await?;
            self.catalog.write().await.add(name)?;
            self.cache.replace(name, Vec::new());
            self.set_selection(Some(name.to_string())).await?;

            info!("Created topic '{}'", name);
            self.notifier.success(format!("Topic '{}' created", name));
            Ok(())
        }
        .await;
        self.report(result)
    }

    /// Select a topic and load its records.
    pub async fn select_topic(&self, topic: &str) -> Result<Vec<Record>, ShelfError> {
        let result: Result<_, ShelfError> = async {
            let owner = self.owner().await?;
            if !self.catalog.read().await.contains(topic) {
                return Err(TopicError::Unknown(topic.to_string()).into());
            }

            self.set_selection(Some(topic.to_string())).await?;
            let records = self.cache.load(self.store.as_ref(), &owner, topic).await?;
            Ok(records)
        }
        .await;
        self.report(result)
    }

    /// Return to the topic list without logging out.
    pub async fn clear_selection(&self) -> Result<(), ShelfError> {
        let result = self.set_selection(None).await;
        self.report(result)
    }

    async fn set_selection(&self, topic: Option<String>) -> Result<(), ShelfError> {
        self.discard_edit().await;
        let mut session = self.session.write().await;
        let session = session.as_mut().ok_or(ShelfError::NotSignedIn)?;
        session.selected_topic = topic;
        session.persist_selection(self.storage.as_ref())?;
        Ok(())
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// Cached records of a topic; `None` if not fetched yet.
    pub fn records(&self, topic: &str) -> Option<Vec<Record>> {
        self.cache.get(topic)
    }

    /// Re-fetch the selected topic.
    pub async fn reload(&self) -> Result<Vec<Record>, ShelfError> {
        let result: Result<_, ShelfError> = async {
            let (owner, topic) = self.owner_and_topic().await?;
            Ok(self.cache.load(self.store.as_ref(), &owner, &topic).await?)
        }
        .await;
        self.report(result)
    }

    /// Load every topic for the consolidated view, in catalog order.
    pub async fn load_all(&self) -> Result<Vec<(String, Vec<Record>)>, ShelfError> {
        let result: Result<_, ShelfError> = async {
            let owner = self.owner().await?;
            let topics = self.topics().await;
            let all = self
                .cache
                .load_all(self.store.as_ref(), &owner, &topics, self.max_concurrent)
                .await?;
            Ok(all)
        }
        .await;
        self.report(result)
    }

    /// Extract records from documents into the selected topic.
    pub async fn upload_documents(
        &self,
        documents: Vec<Document>,
    ) -> Result<Vec<Record>, ShelfError> {
        let result: Result<_, ShelfError> = async {
            if documents.is_empty() {
                return Err(ShelfError::EmptyBatch);
            }
            let (owner, topic) = self.owner_and_topic().await?;
            let created = self
                .store
                .append_from_documents(&owner, &topic, documents)
                .await?;
            self.appended(&topic, &created).await;
            Ok(created)
        }
        .await;
        self.report(result)
    }

    /// Resolve a comma-separated list of DOIs into the selected topic.
    pub async fn fetch_by_keys(&self, input: &str) -> Result<Vec<Record>, ShelfError> {
        let result: Result<_, ShelfError> = async {
            let keys = parse_keys(input);
            if keys.is_empty() {
                return Err(ShelfError::EmptyBatch);
            }
            let (owner, topic) = self.owner_and_topic().await?;
            let created = self.store.append_from_keys(&owner, &topic, &keys).await?;
            self.appended(&topic, &created).await;
            Ok(created)
        }
        .await;
        self.report(result)
    }

    async fn appended(&self, topic: &str, created: &[Record]) {
        self.unapply_edit(topic).await;
        self.cache.apply_append(topic, created);
        info!("Appended {} record(s) to '{}'", created.len(), topic);
        if created.is_empty() {
            self.notifier.info("No new records: all entries already exist");
        } else {
            self.notifier
                .success(format!("Added {} record(s) to {}", created.len(), topic));
        }
    }

    /// Delete the record at `index` of the selected topic.
    ///
    /// The cache changes only once the store acknowledges, and only if it
    /// still holds the deleted revision at that sequence number.
    pub async fn delete_record(&self, index: usize) -> Result<(), ShelfError> {
        let result: Result<_, ShelfError> = async {
            let (owner, topic) = self.owner_and_topic().await?;
            let (record, _) = self.cache.snapshot(&topic, index)?;

            self.store
                .delete_record(&owner, &topic, record.seq, record.revision)
                .await?;

            {
                let mut edit = self.edit.write().await;
                if edit.active().is_some_and(|e| {
                    e.topic == topic
                        && e.snapshot.seq == record.seq
                        && e.snapshot.revision == record.revision
                }) {
                    edit.take();
                }
            }
            self.unapply_edit(&topic).await;
            self.cache.apply_deletion(&topic, record.seq, record.revision);

            info!("Deleted record {} from '{}'", record.seq, topic);
            self.notifier.success("Record deleted");
            Ok(())
        }
        .await;
        self.report(result)
    }

    // =========================================================================
    // Editing
    // =========================================================================

    /// The active edit, if any.
    pub async fn editing(&self) -> Option<EditEntry> {
        self.edit.read().await.active().cloned()
    }

    /// Put the record at `index` of the selected topic into edit mode.
    ///
    /// Any other uncommitted edit is discarded. Beginning an edit on the
    /// record already being edited keeps its changes, unless the topic was
    /// reloaded or changed structurally since.
    pub async fn begin_edit(&self, index: usize) -> Result<Record, ShelfError> {
        let result: Result<_, ShelfError> = async {
            let (_, topic) = self.owner_and_topic().await?;
            let mut edit = self.edit.write().await;
            if edit.is_editing(&topic, index) {
                if let Some(entry) = edit.active() {
                    if entry.epoch == self.cache.epoch(&topic) {
                        return Ok(entry.working.clone());
                    }
                }
            }

            if let Some(previous) = edit.take() {
                self.restore_snapshot(previous);
            }
            let (record, epoch) = self.cache.snapshot(&topic, index)?;
            edit.begin(&topic, index, epoch, record.clone());
            debug!("Editing record {} of '{}'", index, topic);
            Ok(record)
        }
        .await;
        self.report(result)
    }

    /// Change one field of the record being edited.
    pub async fn edit_field(&self, field: RecordField, value: &str) -> Result<(), ShelfError> {
        let result: Result<_, ShelfError> = async {
            let mut edit = self.edit.write().await;
            let entry = edit.set_field(field, value)?;
            let (topic, epoch, index) = (entry.topic.clone(), entry.epoch, entry.index);

            match self
                .cache
                .apply_local_mutation(&topic, epoch, index, field, value)
            {
                Ok(()) => Ok(()),
                Err(CacheError::Stale(_) | CacheError::NotLoaded(_)) => {
                    edit.take();
                    Err(ShelfError::StaleEdit)
                }
                Err(e) => Err(e.into()),
            }
        }
        .await;
        self.report(result)
    }

    /// Send the edit of the record at `index` to the store.
    ///
    /// Field changes are refused while the update is in flight. On failure
    /// the edit stays active with its changes. On success the
    /// cached record takes the committed values and new revision. If the
    /// topic changed structurally since the edit began, either before the
    /// call or while it was in flight, the edit is dropped and `StaleEdit`
    /// is returned.
    pub async fn commit(&self, index: usize) -> Result<Record, ShelfError> {
        let result: Result<_, ShelfError> = async {
            let owner = self.owner().await?;
            let (id, topic, epoch, working) = {
                let mut edit = self.edit.write().await;
                let entry = edit.start_commit(index)?;
                (
                    entry.id,
                    entry.topic.clone(),
                    entry.epoch,
                    entry.working.clone(),
                )
            };

            if self.cache.epoch(&topic) != epoch {
                self.edit.write().await.take_if(id);
                return Err(ShelfError::StaleEdit);
            }

            let ack = match self.store.update_record(&owner, &topic, &working).await {
                Ok(ack) => ack,
                Err(e) => {
                    self.edit.write().await.finish_commit(id);
                    return Err(e.into());
                }
            };
            let mut committed = working;
            if let Some(revision) = ack.revision {
                committed.revision = revision;
            }

            self.edit.write().await.take_if(id);
            match self.cache.write_back(&topic, epoch, index, committed.clone()) {
                Ok(()) => {
                    info!("Committed record {} of '{}'", committed.seq, topic);
                    self.notifier.success("Record updated");
                    Ok(committed)
                }
                Err(CacheError::Stale(_) | CacheError::NotLoaded(_)) => Err(ShelfError::StaleEdit),
                Err(e) => Err(e.into()),
            }
        }
        .await;
        self.report(result)
    }

    /// Drop the active edit, restoring the cached record.
    pub async fn cancel_edit(&self) {
        self.discard_edit().await;
    }

    async fn discard_edit(&self) {
        let previous = self.edit.write().await.take();
        if let Some(previous) = previous {
            self.restore_snapshot(previous);
        }
    }

    /// Before a structural change to `topic`, put the snapshot of an edit on
    /// it back into the cache. The edit itself stays active; its epoch
    /// becomes stale once the change is applied.
    async fn unapply_edit(&self, topic: &str) {
        let edit = self.edit.read().await;
        if let Some(entry) = edit.active().filter(|e| e.topic == topic) {
            self.restore_snapshot(entry.clone());
        }
    }

    fn restore_snapshot(&self, entry: EditEntry) {
        if let Err(e) = self
            .cache
            .write_back(&entry.topic, entry.epoch, entry.index, entry.snapshot)
        {
            debug!("Discarded edit not restored: {}", e);
        }
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Find the topics holding `key` and highlight them.
    pub async fn search(&self, key: &str) -> Result<Vec<String>, ShelfError> {
        let result: Result<_, ShelfError> = async {
            let owner = self.owner().await?;
            let topics = self.topics().await;
            let found = self.search.search(&owner, key, &topics).await?;
            if found.is_empty() {
                self.notifier.info(format!("DOI {} not found in any topic", key));
            } else {
                self.notifier
                    .success(format!("DOI found in: {}", found.join(", ")));
            }
            Ok(found)
        }
        .await;
        self.report(result)
    }

    /// Topics highlighted by the latest search.
    pub fn highlighted(&self) -> Vec<String> {
        self.search.highlight().topics()
    }

    pub fn is_highlighted(&self, topic: &str) -> bool {
        self.search.highlight().contains(topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(ShelfError::NotSignedIn.kind(), ErrorKind::Validation);
        assert_eq!(
            ShelfError::Topic(TopicError::Duplicate("A".into())).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ShelfError::Store(StoreError::Timeout).kind(),
            ErrorKind::Remote
        );
        assert_eq!(
            ShelfError::Store(StoreError::NotFound("x".into())).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ShelfError::Search(SearchError::Store(StoreError::Conflict("x".into()))).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            ShelfError::Search(SearchError::EmptyKey).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ShelfError::Session(SessionError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk"
            ))).kind(),
            ErrorKind::Storage
        );
    }
}
