//! Common test utilities for in-process API testing.
//!
//! This module provides a test fixture that builds the router over an
//! in-memory SQLite store with a mock DOI resolver, so the store API can be
//! exercised without touching the network.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use topicshelf_core::{testing::MockResolver, Config, RecordStore, SqliteRecordStore};
use topicshelf_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use topicshelf_core::testing::fixtures;

/// Boundary used for multipart bodies built by `post_documents`.
const BOUNDARY: &str = "topicshelf-test-boundary";

/// Test fixture for API testing with a mock resolver.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_topic_creation() {
///     let fixture = TestFixture::new();
///
///     let response = fixture.post("/api/v1/owners/f/topics", json!({
///         "name": "Optics"
///     })).await;
///
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Store behind the router, for seeding and inspection
    pub store: Arc<SqliteRecordStore>,
    /// Mock resolver - configure DOI metadata and failures
    pub resolver: Arc<MockResolver>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    pub fn new() -> Self {
        let resolver = Arc::new(MockResolver::new());
        let store = Arc::new(
            SqliteRecordStore::in_memory(resolver.clone()).expect("Failed to create store"),
        );

        let state = Arc::new(AppState::new(
            Config::default(),
            Arc::clone(&store) as Arc<dyn RecordStore>,
        ));

        Self {
            router: create_router(state),
            store,
            resolver,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        self.request_raw("POST", path, body.as_bytes().to_vec(), "application/json")
            .await
    }

    /// Upload documents as a multipart form; each `(filename, text)` becomes
    /// one part named `field`.
    pub async fn post_documents(
        &self,
        path: &str,
        field: &str,
        documents: &[(&str, &str)],
    ) -> TestResponse {
        let mut body = Vec::new();
        for (filename, text) in documents {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(text.as_bytes());
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let content_type = format!("multipart/form-data; boundary={BOUNDARY}");
        self.request_raw("POST", path, body, &content_type).await
    }

    /// Send a request with raw body and custom content type.
    async fn request_raw(
        &self,
        method: &str,
        path: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("Content-Type", content_type)
            .body(Body::from(body))
            .unwrap();

        self.send(request).await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body_bytes).into()))
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
