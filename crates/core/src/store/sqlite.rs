//! SQLite-backed record store used by the reference server.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::{debug, info, warn};

use super::{RecordStore, StoreError};
use crate::ingest::{extract_doi, ResolvedWork, Resolver};
use crate::record::{Ack, Document, Record};

/// SQLite-backed record store.
///
/// Revisions come from a per-topic counter, so two records of one topic
/// never share a revision even after renumbering.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
    resolver: Arc<dyn Resolver>,
}

fn db(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

impl SqliteRecordStore {
    /// Open (or create) the database file.
    pub fn new(path: &Path, resolver: Arc<dyn Resolver>) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            resolver,
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory(resolver: Arc<dyn Resolver>) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            resolver,
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS topics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner TEXT NOT NULL,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                next_revision INTEGER NOT NULL DEFAULT 1,
                UNIQUE(owner, name)
            );

            CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner TEXT NOT NULL,
                topic TEXT NOT NULL,
                seq INTEGER NOT NULL,
                name TEXT NOT NULL,
                year TEXT NOT NULL,
                publication TEXT NOT NULL,
                page_no TEXT NOT NULL,
                summary TEXT,
                abstract TEXT,
                doi TEXT NOT NULL,
                author TEXT,
                remarks TEXT NOT NULL DEFAULT '',
                revision INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_records_topic_seq ON records(owner, topic, seq);
            CREATE INDEX IF NOT EXISTS idx_records_topic_doi ON records(owner, topic, doi);
            "#,
        )
        .map_err(db)?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".to_string()))
    }

    /// Create the topic row if it does not exist yet.
    fn ensure_topic(tx: &Transaction<'_>, owner: &str, topic: &str) -> Result<(), StoreError> {
        tx.execute(
            "INSERT OR IGNORE INTO topics (owner, name, created_at) VALUES (?1, ?2, ?3)",
            params![owner, topic, Utc::now().to_rfc3339()],
        )
        .map_err(db)?;
        Ok(())
    }

    /// Take the next revision from the topic counter.
    fn allocate_revision(tx: &Transaction<'_>, owner: &str, topic: &str) -> Result<u64, StoreError> {
        let revision: i64 = tx
            .query_row(
                "SELECT next_revision FROM topics WHERE owner = ?1 AND name = ?2",
                params![owner, topic],
                |row| row.get(0),
            )
            .map_err(db)?;
        tx.execute(
            "UPDATE topics SET next_revision = next_revision + 1 WHERE owner = ?1 AND name = ?2",
            params![owner, topic],
        )
        .map_err(db)?;
        Ok(revision as u64)
    }

    fn existing_dois(&self, owner: &str, topic: &str) -> Result<HashSet<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT doi FROM records WHERE owner = ?1 AND topic = ?2")
            .map_err(db)?;
        let rows = stmt
            .query_map(params![owner, topic], |row| row.get::<_, String>(0))
            .map_err(db)?;

        let mut dois = HashSet::new();
        for row in rows {
            dois.insert(row.map_err(db)?);
        }
        Ok(dois)
    }

    /// Check that `seq` exists with the expected revision.
    fn check_revision(
        tx: &Transaction<'_>,
        owner: &str,
        topic: &str,
        seq: u32,
        expected: u64,
    ) -> Result<(), StoreError> {
        let stored: Option<i64> = tx
            .query_row(
                "SELECT revision FROM records WHERE owner = ?1 AND topic = ?2 AND seq = ?3",
                params![owner, topic, seq],
                |row| row.get(0),
            )
            .optional()
            .map_err(db)?;

        match stored {
            None => Err(StoreError::NotFound(format!(
                "Record {} in topic '{}'",
                seq, topic
            ))),
            Some(rev) if rev as u64 != expected => Err(StoreError::Conflict(format!(
                "Record {} in topic '{}' is at revision {}, not {}",
                seq, topic, rev, expected
            ))),
            Some(_) => Ok(()),
        }
    }

    /// Resolve keys into works, skipping DOIs already in the topic and
    /// repeats within the batch.
    async fn resolve_new(
        &self,
        owner: &str,
        topic: &str,
        dois: Vec<String>,
    ) -> Result<Vec<ResolvedWork>, StoreError> {
        let mut seen = self.existing_dois(owner, topic)?;
        let mut works = Vec::new();

        for doi in dois {
            if !seen.insert(doi.clone()) {
                debug!("Skipping DOI already in topic '{}': {}", topic, doi);
                continue;
            }
            match self.resolver.resolve(&doi).await? {
                // Stored under the requested key so later ingests dedupe on it.
                Some(mut work) => {
                    work.doi = doi;
                    works.push(work);
                }
                None => warn!("DOI could not be resolved, skipping: {}", doi),
            }
        }

        Ok(works)
    }

    /// Append resolved works in one transaction.
    fn insert_works(
        &self,
        owner: &str,
        topic: &str,
        works: Vec<ResolvedWork>,
    ) -> Result<Vec<Record>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db)?;
        Self::ensure_topic(&tx, owner, topic)?;

        let count: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM records WHERE owner = ?1 AND topic = ?2",
                params![owner, topic],
                |row| row.get(0),
            )
            .map_err(db)?;

        let mut records = Vec::with_capacity(works.len());
        for (offset, work) in works.into_iter().enumerate() {
            let seq = (count as u32) + offset as u32 + 1;
            let revision = Self::allocate_revision(&tx, owner, topic)?;
            let record = work.into_record(seq, revision);
            tx.execute(
                "INSERT INTO records
                 (owner, topic, seq, name, year, publication, page_no, summary, abstract, doi, author, remarks, revision)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    owner,
                    topic,
                    record.seq,
                    record.name,
                    record.year,
                    record.publication,
                    record.page_no,
                    record.summary,
                    record.abstract_text,
                    record.doi,
                    record.author,
                    record.remarks,
                    record.revision as i64,
                ],
            )
            .map_err(db)?;
            records.push(record);
        }

        tx.commit().map_err(db)?;
        Ok(records)
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn list_topics(&self, owner: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT name FROM topics WHERE owner = ?1 ORDER BY id")
            .map_err(db)?;
        let rows = stmt
            .query_map(params![owner], |row| row.get::<_, String>(0))
            .map_err(db)?;

        let mut topics = Vec::new();
        for row in rows {
            topics.push(row.map_err(db)?);
        }
        Ok(topics)
    }

    async fn create_topic(&self, owner: &str, topic: &str) -> Result<Ack, StoreError> {
        if topic.is_empty() {
            return Err(StoreError::InvalidRequest(
                "Topic name cannot be empty".to_string(),
            ));
        }

        let conn = self.lock()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO topics (owner, name, created_at) VALUES (?1, ?2, ?3)",
                params![owner, topic, Utc::now().to_rfc3339()],
            )
            .map_err(db)?;

        if inserted == 0 {
            return Err(StoreError::Conflict(format!(
                "Topic '{}' already exists",
                topic
            )));
        }

        info!("Created topic '{}' for owner '{}'", topic, owner);
        Ok(Ack::empty())
    }

    async fn list_records(&self, owner: &str, topic: &str) -> Result<Vec<Record>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT seq, name, year, publication, page_no, summary, abstract, doi, author, remarks, revision
                 FROM records WHERE owner = ?1 AND topic = ?2 ORDER BY seq",
            )
            .map_err(db)?;

        let rows = stmt
            .query_map(params![owner, topic], |row| {
                Ok(Record {
                    seq: row.get(0)?,
                    name: row.get(1)?,
                    year: row.get(2)?,
                    publication: row.get(3)?,
                    page_no: row.get(4)?,
                    summary: row.get(5)?,
                    abstract_text: row.get(6)?,
                    doi: row.get(7)?,
                    author: row.get(8)?,
                    remarks: row.get(9)?,
                    revision: row.get::<_, i64>(10)? as u64,
                })
            })
            .map_err(db)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(db)?);
        }
        Ok(records)
    }

    async fn append_from_documents(
        &self,
        owner: &str,
        topic: &str,
        documents: Vec<Document>,
    ) -> Result<Vec<Record>, StoreError> {
        let mut dois = Vec::new();
        for document in &documents {
            let text = String::from_utf8_lossy(&document.bytes);
            match extract_doi(&text) {
                Some(doi) => dois.push(doi),
                None => warn!("No DOI found in document '{}', skipping", document.filename),
            }
        }

        let works = self.resolve_new(owner, topic, dois).await?;
        let records = self.insert_works(owner, topic, works)?;
        info!(
            "Ingested {} record(s) from {} document(s) into '{}'",
            records.len(),
            documents.len(),
            topic
        );
        Ok(records)
    }

    async fn append_from_keys(
        &self,
        owner: &str,
        topic: &str,
        keys: &[String],
    ) -> Result<Vec<Record>, StoreError> {
        let works = self.resolve_new(owner, topic, keys.to_vec()).await?;
        let records = self.insert_works(owner, topic, works)?;
        info!(
            "Ingested {} record(s) from {} key(s) into '{}'",
            records.len(),
            keys.len(),
            topic
        );
        Ok(records)
    }

    async fn update_record(
        &self,
        owner: &str,
        topic: &str,
        record: &Record,
    ) -> Result<Ack, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db)?;
        Self::check_revision(&tx, owner, topic, record.seq, record.revision)?;

        let revision = Self::allocate_revision(&tx, owner, topic)?;
        tx.execute(
            "UPDATE records SET name = ?4, year = ?5, publication = ?6, page_no = ?7, summary = ?8,
             abstract = ?9, doi = ?10, author = ?11, remarks = ?12, revision = ?13
             WHERE owner = ?1 AND topic = ?2 AND seq = ?3",
            params![
                owner,
                topic,
                record.seq,
                record.name,
                record.year,
                record.publication,
                record.page_no,
                record.summary,
                record.abstract_text,
                record.doi,
                record.author,
                record.remarks,
                revision as i64,
            ],
        )
        .map_err(db)?;
        tx.commit().map_err(db)?;

        debug!(
            "Updated record {} in '{}' to revision {}",
            record.seq, topic, revision
        );
        Ok(Ack::with_revision(revision))
    }

    async fn delete_record(
        &self,
        owner: &str,
        topic: &str,
        seq: u32,
        revision: u64,
    ) -> Result<Ack, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db)?;
        Self::check_revision(&tx, owner, topic, seq, revision)?;

        tx.execute(
            "DELETE FROM records WHERE owner = ?1 AND topic = ?2 AND seq = ?3",
            params![owner, topic, seq],
        )
        .map_err(db)?;
        tx.execute(
            "UPDATE records SET seq = seq - 1 WHERE owner = ?1 AND topic = ?2 AND seq > ?3",
            params![owner, topic, seq],
        )
        .map_err(db)?;
        tx.commit().map_err(db)?;

        info!("Deleted record {} from '{}'", seq, topic);
        Ok(Ack::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockResolver};

    fn store_with(resolver: MockResolver) -> SqliteRecordStore {
        SqliteRecordStore::in_memory(Arc::new(resolver)).unwrap()
    }

    fn keys(items: &[&str]) -> Vec<String> {
        items.iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test]
    async fn test_list_topics_empty() {
        let store = store_with(MockResolver::new());
        assert!(store.list_topics("f").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_topic_and_list_in_creation_order() {
        let store = store_with(MockResolver::new());
        store.create_topic("f", "Zebra").await.unwrap();
        store.create_topic("f", "Apple").await.unwrap();
        store.create_topic("other", "Mango").await.unwrap();

        assert_eq!(store.list_topics("f").await.unwrap(), vec!["Zebra", "Apple"]);
    }

    #[tokio::test]
    async fn test_create_topic_duplicate_is_conflict() {
        let store = store_with(MockResolver::new());
        store.create_topic("f", "A").await.unwrap();
        let err = store.create_topic("f", "A").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // Case-sensitive: "a" is a different topic
        store.create_topic("f", "a").await.unwrap();
    }

    #[tokio::test]
    async fn test_create_topic_empty_rejected() {
        let store = store_with(MockResolver::new());
        let err = store.create_topic("f", "").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_append_from_keys_in_order() {
        let store = store_with(MockResolver::new());
        let records = store
            .append_from_keys("f", "A", &keys(&["10.1/a", "10.1/b"]))
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].doi, "10.1/a");
        assert_eq!(records[0].seq, 1);
        assert_eq!(records[1].doi, "10.1/b");
        assert_eq!(records[1].seq, 2);
        assert_ne!(records[0].revision, records[1].revision);

        // Ingest created the topic implicitly
        assert_eq!(store.list_topics("f").await.unwrap(), vec!["A"]);
        assert_eq!(store.list_records("f", "A").await.unwrap(), records);
    }

    #[tokio::test]
    async fn test_append_from_keys_skips_existing_and_repeated() {
        let store = store_with(MockResolver::new());
        store
            .append_from_keys("f", "A", &keys(&["10.1/a"]))
            .await
            .unwrap();

        let records = store
            .append_from_keys("f", "A", &keys(&["10.1/a", "10.1/b", "10.1/b"]))
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].doi, "10.1/b");
        assert_eq!(records[0].seq, 2);
    }

    #[tokio::test]
    async fn test_append_from_keys_stores_requested_doi() {
        let resolver = MockResolver::new();
        resolver
            .set_work_for("10.1038/NPHYS1170", fixtures::resolved_work("10.1038/nphys1170"))
            .await;
        let store = store_with(resolver);

        let first = store
            .append_from_keys("f", "A", &keys(&["10.1038/NPHYS1170"]))
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].doi, "10.1038/NPHYS1170");

        let second = store
            .append_from_keys("f", "A", &keys(&["10.1038/NPHYS1170"]))
            .await
            .unwrap();
        assert!(second.is_empty());
        assert_eq!(store.list_records("f", "A").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_append_from_keys_skips_unresolvable() {
        let resolver = MockResolver::new();
        resolver.mark_unknown("10.1/missing").await;
        let store = store_with(resolver);

        let records = store
            .append_from_keys("f", "A", &keys(&["10.1/missing", "10.1/ok"]))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].doi, "10.1/ok");
    }

    #[tokio::test]
    async fn test_append_from_keys_resolver_failure_is_atomic() {
        let resolver = MockResolver::new();
        resolver.fail_on("10.1/bad").await;
        let store = store_with(resolver);

        let result = store
            .append_from_keys("f", "A", &keys(&["10.1/a", "10.1/bad"]))
            .await;
        assert!(matches!(result, Err(StoreError::Resolve(_))));
        assert!(store.list_records("f", "A").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_from_documents_extracts_doi() {
        let store = store_with(MockResolver::new());
        let documents = vec![
            fixtures::document("paper.pdf", "Title page\nhttps://doi.org/10.1234/abcd.5678\n"),
            fixtures::document("scan.pdf", "no identifier in here"),
        ];

        let records = store
            .append_from_documents("f", "A", documents)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].doi, "10.1234/abcd.5678");
    }

    #[tokio::test]
    async fn test_update_record_bumps_revision() {
        let store = store_with(MockResolver::new());
        let mut record = store
            .append_from_keys("f", "A", &keys(&["10.1/a"]))
            .await
            .unwrap()
            .remove(0);

        record.remarks = "important".to_string();
        let ack = store.update_record("f", "A", &record).await.unwrap();
        let new_revision = ack.revision.unwrap();
        assert!(new_revision > record.revision);

        let stored = store.list_records("f", "A").await.unwrap();
        assert_eq!(stored[0].remarks, "important");
        assert_eq!(stored[0].revision, new_revision);
    }

    #[tokio::test]
    async fn test_update_record_stale_revision_conflicts() {
        let store = store_with(MockResolver::new());
        let record = store
            .append_from_keys("f", "A", &keys(&["10.1/a"]))
            .await
            .unwrap()
            .remove(0);

        store.update_record("f", "A", &record).await.unwrap();
        let err = store.update_record("f", "A", &record).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_record_missing_is_not_found() {
        let store = store_with(MockResolver::new());
        let record = fixtures::record(7, "10.1/a");
        let err = store.update_record("f", "A", &record).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_record_renumbers() {
        let store = store_with(MockResolver::new());
        let records = store
            .append_from_keys("f", "A", &keys(&["10.1/a", "10.1/b", "10.1/c"]))
            .await
            .unwrap();

        store
            .delete_record("f", "A", 1, records[0].revision)
            .await
            .unwrap();

        let remaining = store.list_records("f", "A").await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].doi, "10.1/b");
        assert_eq!(remaining[0].seq, 1);
        assert_eq!(remaining[1].doi, "10.1/c");
        assert_eq!(remaining[1].seq, 2);
        // Renumbering keeps revisions
        assert_eq!(remaining[0].revision, records[1].revision);
    }

    #[tokio::test]
    async fn test_delete_with_moved_record_conflicts() {
        let store = store_with(MockResolver::new());
        let records = store
            .append_from_keys("f", "A", &keys(&["10.1/a", "10.1/b"]))
            .await
            .unwrap();
        store
            .delete_record("f", "A", 1, records[0].revision)
            .await
            .unwrap();

        // "10.1/a" is gone and "10.1/b" now sits at seq 1 with its own revision
        let err = store
            .delete_record("f", "A", 1, records[0].revision)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let err = store
            .delete_record("f", "A", 2, records[1].revision)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_owners_are_isolated() {
        let store = store_with(MockResolver::new());
        store
            .append_from_keys("f1", "A", &keys(&["10.1/a"]))
            .await
            .unwrap();
        assert!(store.list_records("f2", "A").await.unwrap().is_empty());
        assert!(store.list_topics("f2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("shelf.db");
        {
            let store = SqliteRecordStore::new(&path, Arc::new(MockResolver::new())).unwrap();
            store.create_topic("f", "Kept").await.unwrap();
        }
        let store = SqliteRecordStore::new(&path, Arc::new(MockResolver::new())).unwrap();
        assert_eq!(store.list_topics("f").await.unwrap(), vec!["Kept"]);
    }
}
