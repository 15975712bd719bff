//! Bounded concurrent fetch of several topics.

use futures::stream::{self, StreamExt};
use tracing::debug;

use super::{RecordStore, StoreError};
use crate::metrics;
use crate::record::Record;

/// Fetch the records of every topic, at most `max_concurrent` at a time.
///
/// Results come back in the order of `topics`. Every fetch runs to
/// completion; if any failed, the first failure in topic order is returned
/// and no partial result is.
pub async fn fetch_partitions(
    store: &dyn RecordStore,
    owner: &str,
    topics: &[String],
    max_concurrent: usize,
) -> Result<Vec<(String, Vec<Record>)>, StoreError> {
    debug!(
        "Fetching {} topic(s) with concurrency {}",
        topics.len(),
        max_concurrent
    );
    metrics::FANOUT_SIZE
        .with_label_values(&[])
        .observe(topics.len() as f64);

    let results: Vec<Result<(String, Vec<Record>), StoreError>> = stream::iter(topics)
        .map(|topic| async move {
            store
                .list_records(owner, topic)
                .await
                .map(|records| (topic.clone(), records))
        })
        .buffered(max_concurrent.max(1))
        .collect()
        .await;

    results.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockRecordStore};

    #[tokio::test]
    async fn test_fetch_partitions_in_topic_order() {
        let store = MockRecordStore::new();
        store.insert_topic("f", "B", vec![fixtures::record(1, "10.1/b")]).await;
        store.insert_topic("f", "A", vec![fixtures::record(1, "10.1/a")]).await;

        let topics = vec!["A".to_string(), "B".to_string()];
        let result = fetch_partitions(&store, "f", &topics, 2).await.unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].0, "A");
        assert_eq!(result[0].1[0].doi, "10.1/a");
        assert_eq!(result[1].0, "B");
    }

    #[tokio::test]
    async fn test_fetch_partitions_zero_limit_still_runs() {
        let store = MockRecordStore::new();
        store.insert_topic("f", "A", vec![]).await;
        let topics = vec!["A".to_string()];
        let result = fetch_partitions(&store, "f", &topics, 0).await.unwrap();
        assert_eq!(result, vec![("A".to_string(), vec![])]);
    }

    #[tokio::test]
    async fn test_fetch_partitions_failure_is_all_or_nothing() {
        let store = MockRecordStore::new();
        store.insert_topic("f", "A", vec![]).await;
        store.insert_topic("f", "B", vec![]).await;
        store.fail_topic("B").await;

        let topics = vec!["A".to_string(), "B".to_string()];
        let result = fetch_partitions(&store, "f", &topics, 4).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_fetch_partitions_respects_limit() {
        let store = MockRecordStore::new();
        let topics: Vec<String> = (0..6).map(|i| format!("T{}", i)).collect();
        for topic in &topics {
            store.insert_topic("f", topic, vec![]).await;
        }
        store.set_delay(std::time::Duration::from_millis(20)).await;

        fetch_partitions(&store, "f", &topics, 2).await.unwrap();
        assert!(store.max_in_flight() <= 2);
        assert!(store.max_in_flight() >= 1);
    }
}
