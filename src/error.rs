//! Error types for the WaniKani client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The local request budget is exhausted, or the remote answered 429.
  #[error("rate limit exceeded")]
  RateLimited,

  /// The remote rejected the API token (401/403). Not retried.
  #[error("invalid or unauthorized API token")]
  InvalidToken,

  /// Any other >= 400 response status.
  #[error("request failed with status {0}")]
  Request(u16),

  /// The connection itself failed before a status was received.
  #[error("connection failed: {0}")]
  Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("cache store error: {0}")]
  Store(#[from] rusqlite::Error),

  #[error("malformed payload: {0}")]
  Json(#[from] serde_json::Error),

  /// A timestamp argument or wire field that is not valid ISO 8601.
  #[error("invalid timestamp {0:?}")]
  InvalidTimestamp(String),

  /// Configuration could not be loaded or is incomplete.
  #[error("configuration error: {0}")]
  Config(String),

  #[error("cache lock poisoned")]
  LockPoisoned,
}

impl Error {
  /// Map an HTTP status >= 400 to the matching error kind.
  pub(crate) fn from_status(status: u16) -> Self {
    match status {
      429 => Error::RateLimited,
      401 | 403 => Error::InvalidToken,
      code => Error::Request(code),
    }
  }

  /// A response body that decoded as JSON but lacks a required part.
  pub(crate) fn malformed(msg: &str) -> Self {
    Error::Json(serde::de::Error::custom(msg))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_mapping() {
    assert!(matches!(Error::from_status(429), Error::RateLimited));
    assert!(matches!(Error::from_status(401), Error::InvalidToken));
    assert!(matches!(Error::from_status(403), Error::InvalidToken));
    assert!(matches!(Error::from_status(500), Error::Request(500)));
    assert!(matches!(Error::from_status(422), Error::Request(422)));
  }
}
