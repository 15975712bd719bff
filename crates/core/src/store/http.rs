//! HTTP client for the remote record store.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{multipart, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::StoreConfig;
use crate::metrics;
use crate::record::{Ack, Document, Record};

use super::{
    CreateTopicRequest, ErrorBody, IngestKeysRequest, RecordStore, StoreError, TopicList,
};

/// Record store client speaking the `/api/v1/owners/...` protocol.
pub struct HttpRecordStore {
    client: Client,
    base_url: String,
}

impl HttpRecordStore {
    /// Create a new client.
    ///
    /// No request timeout is applied unless `timeout_secs` is configured.
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    fn topics_url(&self, owner: &str) -> String {
        format!(
            "{}/api/v1/owners/{}/topics",
            self.base_url,
            urlencoding::encode(owner)
        )
    }

    fn records_url(&self, owner: &str, topic: &str) -> String {
        format!(
            "{}/{}/records",
            self.topics_url(owner),
            urlencoding::encode(topic)
        )
    }

    /// Map a transport error, distinguishing timeouts.
    fn transport(e: reqwest::Error) -> StoreError {
        if e.is_timeout() {
            StoreError::Timeout
        } else {
            StoreError::HttpError(e)
        }
    }

    /// Turn a non-success response into the matching error.
    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or(body);

        Err(match status {
            StatusCode::NOT_FOUND => StoreError::NotFound(message),
            StatusCode::CONFLICT => StoreError::Conflict(message),
            StatusCode::BAD_REQUEST => StoreError::InvalidRequest(message),
            _ => StoreError::ApiError {
                status: status.as_u16(),
                message,
            },
        })
    }

    async fn parse<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, StoreError> {
        response
            .json()
            .await
            .map_err(|e| StoreError::ParseError(format!("Failed to parse {}: {}", what, e)))
    }

    async fn send(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<Response, StoreError> {
        let start = Instant::now();
        let result = match request.send().await {
            Ok(response) => Self::check(response).await,
            Err(e) => Err(Self::transport(e)),
        };
        metrics::observe_remote(operation, result.is_ok(), start.elapsed());
        result
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn list_topics(&self, owner: &str) -> Result<Vec<String>, StoreError> {
        let url = self.topics_url(owner);
        debug!("Listing topics: owner='{}'", owner);

        let response = self.send("list_topics", self.client.get(&url)).await?;
        let list: TopicList = Self::parse(response, "topic list").await?;
        Ok(list.topics)
    }

    async fn create_topic(&self, owner: &str, topic: &str) -> Result<Ack, StoreError> {
        let url = self.topics_url(owner);
        debug!("Creating topic: owner='{}', topic='{}'", owner, topic);

        let body = CreateTopicRequest {
            name: topic.to_string(),
        };
        let response = self
            .send("create_topic", self.client.post(&url).json(&body))
            .await?;
        Self::parse(response, "topic ack").await
    }

    async fn list_records(&self, owner: &str, topic: &str) -> Result<Vec<Record>, StoreError> {
        let url = self.records_url(owner, topic);
        debug!("Listing records: owner='{}', topic='{}'", owner, topic);

        let response = self.send("list_records", self.client.get(&url)).await?;
        Self::parse(response, "record list").await
    }

    async fn append_from_documents(
        &self,
        owner: &str,
        topic: &str,
        documents: Vec<Document>,
    ) -> Result<Vec<Record>, StoreError> {
        let url = format!("{}/documents", self.records_url(owner, topic));
        debug!(
            "Ingesting documents: owner='{}', topic='{}', count={}",
            owner,
            topic,
            documents.len()
        );

        let mut form = multipart::Form::new();
        for document in documents {
            let part = multipart::Part::bytes(document.bytes)
                .file_name(document.filename)
                .mime_str("application/pdf")?;
            form = form.part("files", part);
        }

        let response = self
            .send("append_documents", self.client.post(&url).multipart(form))
            .await?;
        Self::parse(response, "ingested records").await
    }

    async fn append_from_keys(
        &self,
        owner: &str,
        topic: &str,
        keys: &[String],
    ) -> Result<Vec<Record>, StoreError> {
        let url = format!("{}/keys", self.records_url(owner, topic));
        debug!(
            "Ingesting keys: owner='{}', topic='{}', keys={:?}",
            owner, topic, keys
        );

        let body = IngestKeysRequest {
            keys: keys.to_vec(),
        };
        let response = self
            .send("append_keys", self.client.post(&url).json(&body))
            .await?;
        Self::parse(response, "ingested records").await
    }

    async fn update_record(
        &self,
        owner: &str,
        topic: &str,
        record: &Record,
    ) -> Result<Ack, StoreError> {
        let url = format!("{}/{}", self.records_url(owner, topic), record.seq);
        debug!(
            "Updating record: owner='{}', topic='{}', seq={}, revision={}",
            owner, topic, record.seq, record.revision
        );

        let response = self
            .send("update_record", self.client.put(&url).json(record))
            .await?;
        Self::parse(response, "update ack").await
    }

    async fn delete_record(
        &self,
        owner: &str,
        topic: &str,
        seq: u32,
        revision: u64,
    ) -> Result<Ack, StoreError> {
        let url = format!("{}/{}", self.records_url(owner, topic), seq);
        debug!(
            "Deleting record: owner='{}', topic='{}', seq={}, revision={}",
            owner, topic, seq, revision
        );

        let response = self
            .send(
                "delete_record",
                self.client
                    .delete(&url)
                    .query(&[("revision", revision.to_string())]),
            )
            .await?;
        Self::parse(response, "delete ack").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(url: &str) -> HttpRecordStore {
        HttpRecordStore::new(&StoreConfig {
            url: url.to_string(),
            timeout_secs: None,
        })
        .unwrap()
    }

    #[test]
    fn test_urls_trim_trailing_slash() {
        let store = store("http://localhost:8000/");
        assert_eq!(
            store.topics_url("folder-1"),
            "http://localhost:8000/api/v1/owners/folder-1/topics"
        );
    }

    #[test]
    fn test_records_url_encodes_topic() {
        let store = store("http://localhost:8000");
        assert_eq!(
            store.records_url("f", "Deep Learning/NLP"),
            "http://localhost:8000/api/v1/owners/f/topics/Deep%20Learning%2FNLP/records"
        );
    }

    #[tokio::test]
    async fn test_unreachable_store_is_remote_error() {
        let store = store("http://127.0.0.1:1");
        let err = store.list_topics("f").await.unwrap_err();
        assert!(err.is_remote());
    }
}
