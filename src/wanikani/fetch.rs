//! The network/cache exchange for one logical query.
//!
//! Control flow for a cache-eligible list request:
//! read watermark, append `updated_after`, compute the local answer, attach
//! validators, walk pages under the rate limiter, normalize, persist, then
//! advance the watermark. A 304 short-circuits to the local answer with zero
//! store writes. Requests carrying a cache-invalidating parameter skip every
//! validator/watermark step but still persist what they fetched.

use std::sync::Mutex;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{CacheStore, Validator};
use crate::error::{Error, Result};
use crate::ratelimit::RateLimiter;

use super::query::{encode_time, CompiledQuery};
use super::transport::{ApiRequest, Transport};
use super::types::{ApiPayload, Resource, ResourceKind};

/// Borrowed view of everything one fetch needs. Constructed per call by the
/// client, which owns the shared pieces.
pub(crate) struct Fetcher<'a, T: Transport> {
  pub store: &'a CacheStore,
  pub limiter: &'a Mutex<RateLimiter>,
  pub transport: &'a T,
  pub token: &'a str,
  pub user_id: &'a str,
  pub base_url: &'a str,
}

impl<T: Transport> Fetcher<'_, T> {
  /// List request: page walk with conditional-request and watermark
  /// handling. Returns the accumulated items of the walk, or the local
  /// answer when the remote reports nothing changed.
  pub fn fetch_collection(&self, query: &CompiledQuery) -> Result<Vec<Resource>> {
    let kind = query.kind;
    let scope = kind.scope(self.user_id);
    let eligible = query.cacheable;

    let canonical_url = join_url(self.base_url, kind.endpoint(), &query.fragments);

    let mut fragments = query.fragments.clone();
    let mut had_watermark = false;
    if eligible {
      if let Some(mark) = self.store.watermark(self.user_id, &canonical_url)? {
        debug!(url = %canonical_url, since = %mark, "requesting delta since last sync");
        fragments.push(format!("updated_after={}", encode_time(mark)));
        had_watermark = true;
      }
    }
    let first_url = join_url(self.base_url, kind.endpoint(), &fragments);

    // Local answer, computed up front so a 304 returns it unchanged.
    let cached = if eligible {
      Some(self.store.find_documents(scope, kind.objects(), &query.filter)?)
    } else {
      None
    };

    let mut accumulated: Vec<Value> = Vec::new();
    let mut next_url = Some(first_url);
    let mut first = true;

    while let Some(url) = next_url.take() {
      let mut request = ApiRequest::get(&url, self.token);
      if first && eligible {
        if let Some(validator) = self.store.validator(self.user_id, &url)? {
          request.if_modified_since = Some(validator.last_modified);
          request.if_none_match = Some(validator.etag);
        }
      }

      self.acquire_slot()?;
      let response = match self.transport.execute(&request) {
        Ok(response) => response,
        Err(Error::Connection(e)) if had_watermark => {
          warn!(url = %url, error = %e, "connection failed; serving cached documents");
          return Ok(cached.unwrap_or_default());
        }
        Err(e) => return Err(e),
      };

      if response.status == 304 {
        debug!(url = %url, "not modified; serving cached documents");
        return Ok(cached.unwrap_or_default());
      }
      if response.status >= 400 {
        return Err(Error::from_status(response.status));
      }

      if first && eligible {
        if let (Some(last_modified), Some(etag)) = (&response.last_modified, &response.etag) {
          self.store.put_validator(
            self.user_id,
            &url,
            &Validator {
              last_modified: last_modified.clone(),
              etag: etag.clone(),
            },
          )?;
        }
      }

      match ApiPayload::decode(serde_json::from_str(&response.body)?)? {
        ApiPayload::Collection(page) => {
          accumulated.extend(page.data);
          next_url = page.pages.next_url;
        }
        ApiPayload::Single(doc) => {
          // A bare resource terminates the exchange.
          self.store.upsert_document(scope, &doc)?;
          return Ok(vec![doc]);
        }
      }
      first = false;
    }

    // Full walk completed: normalize everything, persist in one batch, and
    // only then advance the watermark.
    let mut docs = Vec::with_capacity(accumulated.len());
    for item in accumulated {
      docs.push(Resource::from_wire(item)?);
    }
    self.store.upsert_documents(scope, &docs)?;
    if eligible {
      self.store.put_watermark(self.user_id, &canonical_url, Utc::now())?;
    }
    Ok(docs)
  }

  /// Point lookup by id against the per-item endpoint. `None` only when the
  /// remote reports not-modified but the document is gone locally.
  pub fn fetch_one(&self, kind: ResourceKind, id: u64) -> Result<Option<Resource>> {
    let scope = kind.scope(self.user_id);
    let url = format!("{}/{}/{}", self.base_url, kind.endpoint(), id);
    let cached = self.store.find_document(scope, kind.objects(), id)?;

    let mut request = ApiRequest::get(&url, self.token);
    if let Some(validator) = self.store.validator(self.user_id, &url)? {
      request.if_modified_since = Some(validator.last_modified);
      request.if_none_match = Some(validator.etag);
    }

    self.acquire_slot()?;
    let response = match self.transport.execute(&request) {
      Ok(response) => response,
      Err(Error::Connection(e)) if cached.is_some() => {
        warn!(url = %url, error = %e, "connection failed; serving cached document");
        return Ok(cached);
      }
      Err(e) => return Err(e),
    };

    if response.status == 304 {
      return Ok(cached);
    }
    if response.status >= 400 {
      return Err(Error::from_status(response.status));
    }

    if let (Some(last_modified), Some(etag)) = (&response.last_modified, &response.etag) {
      self.store.put_validator(
        self.user_id,
        &url,
        &Validator {
          last_modified: last_modified.clone(),
          etag: etag.clone(),
        },
      )?;
    }

    let doc = Resource::from_wire(serde_json::from_str(&response.body)?)?;
    self.store.upsert_document(scope, &doc)?;
    Ok(Some(doc))
  }

  /// Fetch for the id-less singleton endpoints (the summary report).
  pub fn fetch_singleton(&self, kind: ResourceKind) -> Result<Option<Resource>> {
    let scope = kind.scope(self.user_id);
    let object = kind.objects()[0];
    let url = format!("{}/{}", self.base_url, kind.endpoint());
    let cached = self.store.find_singleton(scope, object)?;

    let mut request = ApiRequest::get(&url, self.token);
    if let Some(validator) = self.store.validator(self.user_id, &url)? {
      request.if_modified_since = Some(validator.last_modified);
      request.if_none_match = Some(validator.etag);
    }

    self.acquire_slot()?;
    let response = match self.transport.execute(&request) {
      Ok(response) => response,
      Err(Error::Connection(e)) if cached.is_some() => {
        warn!(url = %url, error = %e, "connection failed; serving cached document");
        return Ok(cached);
      }
      Err(e) => return Err(e),
    };

    if response.status == 304 {
      return Ok(cached);
    }
    if response.status >= 400 {
      return Err(Error::from_status(response.status));
    }

    if let (Some(last_modified), Some(etag)) = (&response.last_modified, &response.etag) {
      self.store.put_validator(
        self.user_id,
        &url,
        &Validator {
          last_modified: last_modified.clone(),
          etag: etag.clone(),
        },
      )?;
    }

    let doc = Resource::from_wire(serde_json::from_str(&response.body)?)?;
    self.store.upsert_document(scope, &doc)?;
    Ok(Some(doc))
  }

  fn acquire_slot(&self) -> Result<()> {
    let mut limiter = self.limiter.lock().map_err(|_| Error::LockPoisoned)?;
    if !limiter.can_request() {
      limiter.sleep_until_allowed();
    }
    Ok(())
  }
}

fn join_url(base: &str, endpoint: &str, fragments: &[String]) -> String {
  if fragments.is_empty() {
    format!("{base}/{endpoint}")
  } else {
    format!("{base}/{endpoint}?{}", fragments.join("&"))
  }
}
