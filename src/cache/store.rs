//! Cache generation storage trait with SQLite and in-memory implementations.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};

use crate::fetch::StoredResponse;

/// Storage for versioned cache generations. The store is policy-free: what
/// gets written, and when generations appear and disappear, is decided by the
/// worker's lifecycle and interceptor handlers.
pub trait CacheStore: Send + Sync {
  /// Create the generation if it does not already exist.
  fn open_generation(&self, tag: &str) -> Result<()>;

  /// Tags of all existing generations.
  fn list_generations(&self) -> Result<Vec<String>>;

  /// Delete a generation and all of its entries. Returns whether it existed.
  fn delete_generation(&self, tag: &str) -> Result<bool>;

  /// Exact-key lookup in one generation.
  fn get(&self, tag: &str, key: &str) -> Result<Option<StoredResponse>>;

  /// Store a response snapshot under `key`, replacing any previous entry.
  fn put(&self, tag: &str, key: &str, response: &StoredResponse) -> Result<()>;
}

impl<T: CacheStore + ?Sized> CacheStore for std::sync::Arc<T> {
  fn open_generation(&self, tag: &str) -> Result<()> {
    (**self).open_generation(tag)
  }

  fn list_generations(&self) -> Result<Vec<String>> {
    (**self).list_generations()
  }

  fn delete_generation(&self, tag: &str) -> Result<bool> {
    (**self).delete_generation(tag)
  }

  fn get(&self, tag: &str, key: &str) -> Result<Option<StoredResponse>> {
    (**self).get(tag, key)
  }

  fn put(&self, tag: &str, key: &str, response: &StoredResponse) -> Result<()> {
    (**self).put(tag, key, response)
  }
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryCacheStore {
  generations: RwLock<HashMap<String, HashMap<String, StoredResponse>>>,
}

impl MemoryCacheStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheStore for MemoryCacheStore {
  fn open_generation(&self, tag: &str) -> Result<()> {
    let mut generations = self
      .generations
      .write()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    generations.entry(tag.to_string()).or_default();
    Ok(())
  }

  fn list_generations(&self) -> Result<Vec<String>> {
    let generations = self
      .generations
      .read()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let mut tags: Vec<String> = generations.keys().cloned().collect();
    tags.sort();
    Ok(tags)
  }

  fn delete_generation(&self, tag: &str) -> Result<bool> {
    let mut generations = self
      .generations
      .write()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(generations.remove(tag).is_some())
  }

  fn get(&self, tag: &str, key: &str) -> Result<Option<StoredResponse>> {
    let generations = self
      .generations
      .read()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(generations.get(tag).and_then(|entries| entries.get(key)).cloned())
  }

  fn put(&self, tag: &str, key: &str, response: &StoredResponse) -> Result<()> {
    let mut generations = self
      .generations
      .write()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    generations
      .entry(tag.to_string())
      .or_default()
      .insert(key.to_string(), response.clone());
    Ok(())
  }
}

/// SQLite-backed store, persistent across worker restarts.
pub struct SqliteCacheStore {
  conn: Mutex<Connection>,
}

impl SqliteCacheStore {
  /// Open the store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open an in-memory store (tests).
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Get the default database path.
  fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("standby").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One row per cache generation
CREATE TABLE IF NOT EXISTS generations (
    tag TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Stored response snapshots, keyed by hashed request identity
CREATE TABLE IF NOT EXISTS entries (
    tag TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    key TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers BLOB NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (tag, key_hash)
);

CREATE INDEX IF NOT EXISTS idx_entries_tag ON entries(tag);
"#;

/// SHA256 hash of the request identity, for stable fixed-length keys.
fn key_hash(key: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(key.as_bytes());
  hex::encode(hasher.finalize())
}

impl CacheStore for SqliteCacheStore {
  fn open_generation(&self, tag: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO generations (tag) VALUES (?)",
        params![tag],
      )
      .map_err(|e| eyre!("Failed to open generation {}: {}", tag, e))?;

    Ok(())
  }

  fn list_generations(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT tag FROM generations ORDER BY tag")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let tags = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list generations: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(tags)
  }

  fn delete_generation(&self, tag: &str) -> Result<bool> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    // Dropping an uncommitted transaction rolls it back, so a failure
    // partway through never leaves the connection mid-transaction.
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM entries WHERE tag = ?", params![tag])
      .map_err(|e| eyre!("Failed to delete entries for {}: {}", tag, e))?;

    let removed = tx
      .execute("DELETE FROM generations WHERE tag = ?", params![tag])
      .map_err(|e| eyre!("Failed to delete generation {}: {}", tag, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn get(&self, tag: &str, key: &str) -> Result<Option<StoredResponse>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT status, headers, body FROM entries WHERE tag = ? AND key_hash = ?")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let result: Option<(u16, Vec<u8>, Vec<u8>)> = stmt
      .query_row(params![tag, key_hash(key)], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
      })
      .ok();

    match result {
      Some((status, headers, body)) => {
        let headers: Vec<(String, String)> = serde_json::from_slice(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;
        Ok(Some(StoredResponse {
          status,
          headers,
          body,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, tag: &str, key: &str, response: &StoredResponse) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let headers = serde_json::to_vec(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    // Entries must always belong to a listed generation, or activation
    // could never garbage-collect them.
    conn
      .execute(
        "INSERT OR IGNORE INTO generations (tag) VALUES (?)",
        params![tag],
      )
      .map_err(|e| eyre!("Failed to open generation {}: {}", tag, e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO entries (tag, key_hash, key, status, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
        params![tag, key_hash(key), key, response.status, headers, response.body],
      )
      .map_err(|e| eyre!("Failed to store entry {}: {}", key, e))?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn response(body: &str) -> StoredResponse {
    StoredResponse::new(200, body.as_bytes().to_vec()).with_header("Content-Type", "text/html")
  }

  #[test]
  fn test_sqlite_put_get_roundtrip() {
    let store = SqliteCacheStore::open_in_memory().unwrap();
    store.open_generation("v1").unwrap();
    store.put("v1", "GET /", &response("<html>")).unwrap();

    let hit = store.get("v1", "GET /").unwrap().unwrap();
    assert_eq!(hit.status, 200);
    assert_eq!(hit.header("content-type"), Some("text/html"));
    assert_eq!(hit.body, b"<html>");

    assert!(store.get("v1", "GET /missing").unwrap().is_none());
  }

  #[test]
  fn test_sqlite_put_replaces_existing_entry() {
    let store = SqliteCacheStore::open_in_memory().unwrap();
    store.open_generation("v1").unwrap();
    store.put("v1", "GET /", &response("old")).unwrap();
    store.put("v1", "GET /", &response("new")).unwrap();

    let hit = store.get("v1", "GET /").unwrap().unwrap();
    assert_eq!(hit.body, b"new");
  }

  #[test]
  fn test_sqlite_generations_are_isolated() {
    let store = SqliteCacheStore::open_in_memory().unwrap();
    store.open_generation("v1").unwrap();
    store.open_generation("v2").unwrap();
    store.put("v1", "GET /", &response("one")).unwrap();

    assert!(store.get("v2", "GET /").unwrap().is_none());
  }

  #[test]
  fn test_sqlite_delete_generation_removes_entries() {
    let store = SqliteCacheStore::open_in_memory().unwrap();
    store.open_generation("v1").unwrap();
    store.open_generation("v2").unwrap();
    store.put("v1", "GET /", &response("one")).unwrap();

    assert!(store.delete_generation("v1").unwrap());
    assert!(!store.delete_generation("v1").unwrap());
    assert_eq!(store.list_generations().unwrap(), vec!["v2"]);
    assert!(store.get("v1", "GET /").unwrap().is_none());
  }

  #[test]
  fn test_sqlite_open_generation_is_idempotent() {
    let store = SqliteCacheStore::open_in_memory().unwrap();
    store.open_generation("v1").unwrap();
    store.open_generation("v1").unwrap();
    assert_eq!(store.list_generations().unwrap(), vec!["v1"]);
  }

  #[test]
  fn test_put_without_open_registers_generation() {
    // Entries written before open_generation must still be listed, or
    // activation could never garbage-collect them.
    let sqlite = SqliteCacheStore::open_in_memory().unwrap();
    sqlite.put("v1", "GET /", &response("one")).unwrap();
    assert_eq!(sqlite.list_generations().unwrap(), vec!["v1"]);
    assert!(sqlite.delete_generation("v1").unwrap());
    assert!(sqlite.get("v1", "GET /").unwrap().is_none());

    let memory = MemoryCacheStore::new();
    memory.put("v1", "GET /", &response("one")).unwrap();
    assert_eq!(memory.list_generations().unwrap(), vec!["v1"]);
  }

  #[test]
  fn test_memory_store_behaves_like_sqlite() {
    let store = MemoryCacheStore::new();
    store.open_generation("v1").unwrap();
    store.put("v1", "GET /", &response("mem")).unwrap();

    assert_eq!(store.get("v1", "GET /").unwrap().unwrap().body, b"mem");
    assert_eq!(store.list_generations().unwrap(), vec!["v1"]);
    assert!(store.delete_generation("v1").unwrap());
    assert!(store.list_generations().unwrap().is_empty());
  }
}
