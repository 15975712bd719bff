//! Record API handlers.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use serde::Deserialize;
use topicshelf_core::{store::IngestKeysRequest, Ack, Document, Record};
use tracing::debug;

use super::handlers::{bad_request, store_error, ApiError};
use crate::state::AppState;

/// Multipart field carrying uploaded documents.
const DOCUMENT_FIELD: &str = "files";

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    pub revision: u64,
}

/// GET /api/v1/owners/{owner}/topics/{topic}/records
pub async fn list_records(
    State(state): State<Arc<AppState>>,
    Path((owner, topic)): Path<(String, String)>,
) -> Result<Json<Vec<Record>>, ApiError> {
    let records = state
        .store()
        .list_records(&owner, &topic)
        .await
        .map_err(store_error)?;
    debug!("Listed {} record(s) of '{}'", records.len(), topic);
    Ok(Json(records))
}

/// POST /api/v1/owners/{owner}/topics/{topic}/records/documents
///
/// Ingest uploaded documents. Every `files` part is one document; other
/// parts are ignored.
pub async fn ingest_documents(
    State(state): State<Arc<AppState>>,
    Path((owner, topic)): Path<(String, String)>,
    mut multipart: Multipart,
) -> Result<Json<Vec<Record>>, ApiError> {
    let mut documents = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(bad_request(format!("Invalid multipart body: {}", e))),
        };
        if field.name() != Some(DOCUMENT_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or("document").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("Failed to read '{}': {}", filename, e)))?;
        documents.push(Document::new(filename, bytes.to_vec()));
    }

    if documents.is_empty() {
        return Err(bad_request("No documents uploaded"));
    }

    let count = documents.len();
    let records = state
        .store()
        .append_from_documents(&owner, &topic, documents)
        .await
        .map_err(store_error)?;
    debug!(
        "Ingested {} of {} document(s) into '{}'",
        records.len(),
        count,
        topic
    );
    Ok(Json(records))
}

/// POST /api/v1/owners/{owner}/topics/{topic}/records/keys
pub async fn ingest_keys(
    State(state): State<Arc<AppState>>,
    Path((owner, topic)): Path<(String, String)>,
    Json(request): Json<IngestKeysRequest>,
) -> Result<Json<Vec<Record>>, ApiError> {
    let keys: Vec<String> = request
        .keys
        .iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();
    if keys.is_empty() {
        return Err(bad_request("No keys given"));
    }

    let records = state
        .store()
        .append_from_keys(&owner, &topic, &keys)
        .await
        .map_err(store_error)?;
    debug!(
        "Ingested {} of {} key(s) into '{}'",
        records.len(),
        keys.len(),
        topic
    );
    Ok(Json(records))
}

/// PUT /api/v1/owners/{owner}/topics/{topic}/records/{seq}
///
/// Replace a record. The body's revision must match the stored one.
pub async fn update_record(
    State(state): State<Arc<AppState>>,
    Path((owner, topic, seq)): Path<(String, String, u32)>,
    Json(mut record): Json<Record>,
) -> Result<Json<Ack>, ApiError> {
    record.seq = seq;
    let ack = state
        .store()
        .update_record(&owner, &topic, &record)
        .await
        .map_err(store_error)?;
    debug!("Updated record {} of '{}': {:?}", seq, topic, ack);
    Ok(Json(ack))
}

/// DELETE /api/v1/owners/{owner}/topics/{topic}/records/{seq}?revision=N
pub async fn delete_record(
    State(state): State<Arc<AppState>>,
    Path((owner, topic, seq)): Path<(String, String, u32)>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<Ack>, ApiError> {
    let ack = state
        .store()
        .delete_record(&owner, &topic, seq, params.revision)
        .await
        .map_err(store_error)?;
    debug!("Deleted record {} of '{}'", seq, topic);
    Ok(Json(ack))
}
