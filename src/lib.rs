//! A caching client for the WaniKani v2 REST API.
//!
//! The remote budget is tiny (a handful of requests per minute), so every
//! fetched document lands in a local SQLite store and later queries answer
//! from there whenever the remote confirms nothing changed. Conditional
//! requests (`If-Modified-Since`/`If-None-Match`) skip unchanged
//! collections, per-URL sync watermarks turn repeat list fetches into
//! deltas, and a dead connection degrades to previously synced results
//! instead of an error.
//!
//! `Client` is the entry point; construction resolves the API token to an
//! account so that cached state is shared between tokens of the same user.

pub mod cache;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod wanikani;

pub use cache::CacheStore;
pub use config::Config;
pub use error::{Error, Result};
pub use ratelimit::RateLimiter;
pub use wanikani::{
  AssignmentFilters, BasicFilters, Client, Ids, NewReview, ReviewFilters, ReviewOutcome,
  ReviewStatisticFilters, ReviewTarget, StudyMaterialFilters, StudyMaterialUpdate, SubjectFilters,
  TimeArg, UserPreferences,
};
