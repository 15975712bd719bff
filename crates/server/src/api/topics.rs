//! Topic API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use topicshelf_core::{
    store::{CreateTopicRequest, TopicList},
    Ack,
};
use tracing::info;

use super::handlers::{bad_request, store_error, ApiError};
use crate::state::AppState;

/// GET /api/v1/owners/{owner}/topics
///
/// List an owner's topics in creation order.
pub async fn list_topics(
    State(state): State<Arc<AppState>>,
    Path(owner): Path<String>,
) -> Result<Json<TopicList>, ApiError> {
    let topics = state.store().list_topics(&owner).await.map_err(store_error)?;
    Ok(Json(TopicList { topics }))
}

/// POST /api/v1/owners/{owner}/topics
///
/// Create an empty topic. Duplicates are rejected with 409.
pub async fn create_topic(
    State(state): State<Arc<AppState>>,
    Path(owner): Path<String>,
    Json(request): Json<CreateTopicRequest>,
) -> Result<Json<Ack>, ApiError> {
    let name = request.name.as_str();
    if name.is_empty() {
        return Err(bad_request("Topic name cannot be empty"));
    }

    let ack = state
        .store()
        .create_topic(&owner, name)
        .await
        .map_err(store_error)?;
    info!("Created topic '{}' for owner '{}'", name, owner);
    Ok(Json(ack))
}
