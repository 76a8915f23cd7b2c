//! Key-value store for persistent application state.
//!
//! Stores simple string key-value pairs in SQLite. Values are opaque to the
//! store; callers serialise whatever they need (the skills crate keeps its
//! enable-state map as JSON under a single key).

use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::StoreResult;

/// Persistent string key-value store.
#[derive(Clone)]
pub struct KvStore {
    db: Database,
}

impl KvStore {
    /// Create a new key-value store backed by `db`.
    ///
    /// The database must already be migrated.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Get a value by key, returning `None` if not found.
    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let key = key.to_string();
        self.db
            .execute(move |conn| {
                let result = conn.query_row(
                    "SELECT value FROM kv_state WHERE key = ?1",
                    rusqlite::params![key],
                    |row| row.get(0),
                );
                match result {
                    Ok(value) => Ok(Some(value)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
    }

    /// Set a value for a key (insert or update).
    #[instrument(skip(self, value))]
    pub async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let key = key.to_string();
        let value = value.to_string();
        let now = chrono::Utc::now().timestamp();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO kv_state (key, value, updated_at) VALUES (?1, ?2, ?3) \
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, \
                     updated_at = excluded.updated_at",
                    rusqlite::params![key, value, now],
                )?;
                debug!(key = %key, "state value updated");
                Ok(())
            })
            .await
    }

    /// Delete a key, returning `true` if it existed.
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> StoreResult<bool> {
        let key = key.to_string();
        self.db
            .execute(move |conn| {
                let deleted =
                    conn.execute("DELETE FROM kv_state WHERE key = ?1", rusqlite::params![key])?;
                Ok(deleted > 0)
            })
            .await
    }

    /// Get a value deserialised from JSON, returning `None` if not found.
    pub async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> StoreResult<Option<T>> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Serialise `value` to JSON and store it under `key`.
    pub async fn set_json<T: serde::Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw).await
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        db
    }

    #[tokio::test]
    async fn get_nonexistent_returns_none() {
        let store = KvStore::new(setup_db().await);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_and_get() {
        let store = KvStore::new(setup_db().await);

        store.set("key1", "value1").await.unwrap();
        assert_eq!(store.get("key1").await.unwrap(), Some("value1".to_string()));
    }

    #[tokio::test]
    async fn set_overwrites() {
        let store = KvStore::new(setup_db().await);

        store.set("key1", "old").await.unwrap();
        store.set("key1", "new").await.unwrap();
        assert_eq!(store.get("key1").await.unwrap(), Some("new".to_string()));
    }

    #[tokio::test]
    async fn delete_existing_and_missing() {
        let store = KvStore::new(setup_db().await);

        store.set("key1", "val").await.unwrap();
        assert!(store.delete("key1").await.unwrap());
        assert!(store.get("key1").await.unwrap().is_none());
        assert!(!store.delete("key1").await.unwrap());
    }

    #[tokio::test]
    async fn json_helpers() {
        let store = KvStore::new(setup_db().await);

        let mut map = std::collections::BTreeMap::new();
        map.insert("a".to_string(), 1_u32);
        store.set_json("map", &map).await.unwrap();

        let loaded: Option<std::collections::BTreeMap<String, u32>> =
            store.get_json("map").await.unwrap();
        assert_eq!(loaded, Some(map));
    }

    #[tokio::test]
    async fn get_json_rejects_garbage() {
        let store = KvStore::new(setup_db().await);

        store.set("map", "not json").await.unwrap();
        let result: StoreResult<Option<Vec<u8>>> = store.get_json("map").await;
        assert!(result.is_err());
    }
}
