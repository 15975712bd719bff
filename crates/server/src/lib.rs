//! Reference record store server.
//!
//! Serves the record store operations over HTTP, backed by SQLite and a DOI
//! resolver, so the topicshelf client can be run end to end.

pub mod api;
pub mod metrics;
pub mod state;
