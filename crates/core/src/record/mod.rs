//! Bibliographic records.
//!
//! A `Record` is one entry in a topic. Its sequence number is an ordinal
//! assigned by the store and its revision is the store's version stamp used
//! for optimistic concurrency on update and delete.

mod types;

pub use types::*;
