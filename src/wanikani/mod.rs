//! Client for the WaniKani v2 REST API.
//!
//! This module owns everything that touches the remote:
//! - Filter structs compile to deterministic URL fragments plus an
//!   equivalent local predicate set
//! - Reads run conditional requests and fall back to the store on a 304
//!   or a dead connection
//! - Writes go out immediately and their response documents are cached
//! - All traffic shares one rate-limiter budget

mod client;
mod fetch;
mod query;
mod transport;
pub(crate) mod types;

pub use client::{Client, NewReview, ReviewOutcome, ReviewTarget, StudyMaterialUpdate, UserPreferences};
pub use query::{
  AssignmentFilters, BasicFilters, Ids, ReviewFilters, ReviewStatisticFilters, StudyMaterialFilters,
  SubjectFilters, TimeArg,
};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, Transport};
pub use types::{Resource, ResourceKind, SHARED_SCOPE};
