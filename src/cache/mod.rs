//! Local persistence for fetched API data.
//!
//! This module provides the document store behind the client:
//! - Resource documents as JSON blobs, upserted idempotently per scope
//! - Conditional-request validators (ETag / Last-Modified) per user and URL
//! - Incremental-sync watermarks per canonical URL family
//! - Identity records mapping API tokens onto local accounts
//! - Filter expressions so cached scans answer compiled queries locally

mod filter;
mod store;

pub use filter::{DocumentFilter, Field, FieldPredicate, Predicate};
pub use store::{CacheStore, Identity, Validator};
