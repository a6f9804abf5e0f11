//! SQLite-backed document store: resources, validators, watermarks, identities.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::cache::filter::DocumentFilter;
use crate::error::{Error, Result};
use crate::wanikani::types::{format_wire_time, parse_wire_time, Resource};

/// Conditional-request validators captured from a response.
#[derive(Debug, Clone, PartialEq)]
pub struct Validator {
  pub last_modified: String,
  pub etag: String,
}

/// One local account: the profile document plus every token known for it.
#[derive(Debug, Clone)]
pub struct Identity {
  pub user_id: String,
  pub tokens: Vec<String>,
  pub profile: Resource,
}

/// Schema for the cache database.
const CACHE_SCHEMA: &str = r#"
-- Resource documents as JSON blobs. id 0 stands in for the id-less
-- user/report objects so the primary key stays total.
CREATE TABLE IF NOT EXISTS resources (
    scope TEXT NOT NULL,
    object TEXT NOT NULL,
    id INTEGER NOT NULL,
    data_updated_at TEXT,
    data TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope, object, id)
);

CREATE INDEX IF NOT EXISTS idx_resources_scope_object
    ON resources(scope, object);

-- Conditional-request validators, keyed by the literal request URL.
CREATE TABLE IF NOT EXISTS validators (
    user_id TEXT NOT NULL,
    url_hash TEXT NOT NULL,
    url TEXT NOT NULL,
    last_modified TEXT NOT NULL,
    etag TEXT NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (user_id, url_hash)
);

-- Incremental-sync watermarks, keyed by the canonical URL family.
CREATE TABLE IF NOT EXISTS sync_marks (
    user_id TEXT NOT NULL,
    url_hash TEXT NOT NULL,
    url TEXT NOT NULL,
    synced_at TEXT NOT NULL,
    PRIMARY KEY (user_id, url_hash)
);

-- Local identities and the tokens that map onto them.
CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_tokens (
    token TEXT PRIMARY KEY,
    user_id TEXT NOT NULL
);
"#;

/// The local document store. One SQLite database, connection behind a mutex.
pub struct CacheStore {
  conn: Mutex<Connection>,
}

impl CacheStore {
  /// Open (creating if needed) the database at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| Error::Connection(Box::new(e)))?;
    }
    Self::init(Connection::open(path)?)
  }

  /// Open an ephemeral in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    Self::init(Connection::open_in_memory()?)
  }

  fn init(conn: Connection) -> Result<Self> {
    conn.execute_batch(CACHE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|_| Error::LockPoisoned)
  }

  /// Insert or overwrite one resource document.
  pub fn upsert_document(&self, scope: &str, doc: &Resource) -> Result<()> {
    let conn = self.lock()?;
    upsert_in(&conn, scope, doc)
  }

  /// Insert or overwrite a batch of documents in one transaction.
  pub fn upsert_documents(&self, scope: &str, docs: &[Resource]) -> Result<()> {
    let conn = self.lock()?;
    conn.execute_batch("BEGIN")?;
    for doc in docs {
      if let Err(e) = upsert_in(&conn, scope, doc) {
        let _ = conn.execute_batch("ROLLBACK");
        return Err(e);
      }
    }
    conn.execute_batch("COMMIT")?;
    Ok(())
  }

  /// Point lookup by id, restricted to the given object names.
  pub fn find_document(
    &self,
    scope: &str,
    objects: &[&str],
    id: u64,
  ) -> Result<Option<Resource>> {
    let conn = self.lock()?;
    let mut stmt =
      conn.prepare("SELECT data FROM resources WHERE scope = ? AND id = ?")?;
    let mut rows = stmt.query(params![scope, id as i64])?;
    while let Some(row) = rows.next()? {
      let data: String = row.get(0)?;
      let doc: Resource = serde_json::from_str(&data)?;
      if objects.contains(&doc.object.as_str()) {
        return Ok(Some(doc));
      }
    }
    Ok(None)
  }

  /// Lookup for the id-less singleton objects (`user`, `report`).
  pub fn find_singleton(&self, scope: &str, object: &str) -> Result<Option<Resource>> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare(
      "SELECT data FROM resources WHERE scope = ? AND object = ? ORDER BY id LIMIT 1",
    )?;
    let data: Option<String> = stmt
      .query_row(params![scope, object], |row| row.get(0))
      .ok();
    match data {
      Some(data) => Ok(Some(serde_json::from_str(&data)?)),
      None => Ok(None),
    }
  }

  /// Scan a scope and return every document matching the filter, restricted
  /// to the given object names. Ordered by object then id for stable output.
  pub fn find_documents(
    &self,
    scope: &str,
    objects: &[&str],
    filter: &DocumentFilter,
  ) -> Result<Vec<Resource>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT data FROM resources WHERE scope = ? ORDER BY object, id")?;
    let rows = stmt.query_map(params![scope], |row| row.get::<_, String>(0))?;

    let mut docs = Vec::new();
    for row in rows {
      let doc: Resource = serde_json::from_str(&row?)?;
      if objects.contains(&doc.object.as_str()) && filter.matches(&doc) {
        docs.push(doc);
      }
    }
    Ok(docs)
  }

  /// Stored validator for the literal URL, if any.
  pub fn validator(&self, user_id: &str, url: &str) -> Result<Option<Validator>> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare(
      "SELECT last_modified, etag FROM validators WHERE user_id = ? AND url_hash = ?",
    )?;
    let result = stmt
      .query_row(params![user_id, url_hash(url)], |row| {
        Ok(Validator {
          last_modified: row.get(0)?,
          etag: row.get(1)?,
        })
      })
      .ok();
    Ok(result)
  }

  pub fn put_validator(&self, user_id: &str, url: &str, validator: &Validator) -> Result<()> {
    let conn = self.lock()?;
    conn.execute(
      "INSERT OR REPLACE INTO validators (user_id, url_hash, url, last_modified, etag)
       VALUES (?, ?, ?, ?, ?)",
      params![
        user_id,
        url_hash(url),
        url,
        validator.last_modified,
        validator.etag
      ],
    )?;
    Ok(())
  }

  /// Last successful full-walk time for a canonical URL family.
  pub fn watermark(&self, user_id: &str, canonical_url: &str) -> Result<Option<DateTime<Utc>>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT synced_at FROM sync_marks WHERE user_id = ? AND url_hash = ?")?;
    let raw: Option<String> = stmt
      .query_row(params![user_id, url_hash(canonical_url)], |row| row.get(0))
      .ok();
    raw.map(|s| parse_wire_time(&s)).transpose()
  }

  pub fn put_watermark(
    &self,
    user_id: &str,
    canonical_url: &str,
    synced_at: DateTime<Utc>,
  ) -> Result<()> {
    let conn = self.lock()?;
    conn.execute(
      "INSERT OR REPLACE INTO sync_marks (user_id, url_hash, url, synced_at)
       VALUES (?, ?, ?, ?)",
      params![
        user_id,
        url_hash(canonical_url),
        canonical_url,
        format_wire_time(synced_at)
      ],
    )?;
    Ok(())
  }

  pub fn identity_by_token(&self, token: &str) -> Result<Option<Identity>> {
    let user_id: Option<String> = {
      let conn = self.lock()?;
      let mut stmt = conn.prepare("SELECT user_id FROM user_tokens WHERE token = ?")?;
      stmt.query_row(params![token], |row| row.get(0)).ok()
    };
    match user_id {
      Some(user_id) => self.identity_by_id(&user_id),
      None => Ok(None),
    }
  }

  pub fn identity_by_id(&self, user_id: &str) -> Result<Option<Identity>> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare("SELECT data FROM users WHERE user_id = ?")?;
    let data: Option<String> = stmt
      .query_row(params![user_id], |row| row.get(0))
      .ok();
    let Some(data) = data else {
      return Ok(None);
    };
    let profile: Resource = serde_json::from_str(&data)?;

    let mut stmt =
      conn.prepare("SELECT token FROM user_tokens WHERE user_id = ? ORDER BY rowid")?;
    let tokens = stmt
      .query_map(params![user_id], |row| row.get::<_, String>(0))?
      .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Some(Identity {
      user_id: user_id.to_string(),
      tokens,
      profile,
    }))
  }

  /// Record a brand-new identity with its profile and tokens.
  pub fn insert_identity(&self, identity: &Identity) -> Result<()> {
    let conn = self.lock()?;
    conn.execute(
      "INSERT OR REPLACE INTO users (user_id, data) VALUES (?, ?)",
      params![identity.user_id, serde_json::to_string(&identity.profile)?],
    )?;
    for token in &identity.tokens {
      conn.execute(
        "INSERT OR REPLACE INTO user_tokens (token, user_id) VALUES (?, ?)",
        params![token, identity.user_id],
      )?;
    }
    Ok(())
  }

  /// Map one more token onto an existing identity.
  pub fn attach_token(&self, user_id: &str, token: &str) -> Result<()> {
    let conn = self.lock()?;
    conn.execute(
      "INSERT OR REPLACE INTO user_tokens (token, user_id) VALUES (?, ?)",
      params![token, user_id],
    )?;
    Ok(())
  }

  /// Overwrite the profile document, leaving the token list untouched.
  pub fn replace_profile(&self, user_id: &str, profile: &Resource) -> Result<()> {
    let conn = self.lock()?;
    conn.execute(
      "INSERT OR REPLACE INTO users (user_id, data) VALUES (?, ?)",
      params![user_id, serde_json::to_string(profile)?],
    )?;
    Ok(())
  }
}

fn upsert_in(conn: &Connection, scope: &str, doc: &Resource) -> Result<()> {
  conn.execute(
    "INSERT OR REPLACE INTO resources (scope, object, id, data_updated_at, data, cached_at)
     VALUES (?, ?, ?, ?, ?, datetime('now'))",
    params![
      scope,
      doc.object,
      doc.id.unwrap_or(0) as i64,
      doc.data_updated_at.map(format_wire_time),
      serde_json::to_string(doc)?
    ],
  )?;
  Ok(())
}

/// SHA-256 of the literal URL, hex encoded. Fixed-length store keys
/// regardless of how long the query string grows.
fn url_hash(url: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  hex::encode(hasher.finalize())
}
