use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{handlers, middleware::metrics_middleware, records, topics};
use crate::state::AppState;

/// Upper bound for a multipart document upload.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health, config and metrics
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::metrics))
        // Topics
        .route(
            "/owners/{owner}/topics",
            get(topics::list_topics).post(topics::create_topic),
        )
        // Records
        .route(
            "/owners/{owner}/topics/{topic}/records",
            get(records::list_records),
        )
        .route(
            "/owners/{owner}/topics/{topic}/records/documents",
            post(records::ingest_documents).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/owners/{owner}/topics/{topic}/records/keys",
            post(records::ingest_keys),
        )
        .route(
            "/owners/{owner}/topics/{topic}/records/{seq}",
            put(records::update_record).delete(records::delete_record),
        )
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
