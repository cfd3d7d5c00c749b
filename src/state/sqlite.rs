//! `Store` backed by the SQLite `Database`.
//!
//! SQLite calls are synchronous, so each one runs under `spawn_blocking`
//! to keep the async workers free.

use crate::error::StoreError;
use crate::state::{Database, Store};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Durable store shared by every worker.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteStore {
    /// Open (or create) the database file, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend(e.to_string()))?;
            }
        }
        Ok(Self::from_database(Database::open(path)?))
    }

    /// In-memory SQLite, for tests.
    pub fn open_memory() -> Result<Self, StoreError> {
        Ok(Self::from_database(Database::open_memory()?))
    }

    pub fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Run a database call on the blocking pool.
    async fn with_db<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> rusqlite::Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let db = db.blocking_lock();
            f(&db).map_err(StoreError::from)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("blocking task failed: {e}")))?
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get(&self, key: &str) -> Result<String, StoreError> {
        let k = key.to_string();
        self.with_db(move |db| db.kv_get(&k))
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let (k, v) = (key.to_string(), value.to_string());
        self.with_db(move |db| db.kv_set(&k, &v)).await
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let k = key.to_string();
        self.with_db(move |db| db.kv_incr(&k)).await
    }

    async fn push(&self, list: &str, value: &str) -> Result<(), StoreError> {
        let (l, v) = (list.to_string(), value.to_string());
        self.with_db(move |db| db.list_push(&l, &v)).await
    }

    async fn pop(&self, list: &str) -> Result<Option<String>, StoreError> {
        let l = list.to_string();
        self.with_db(move |db| db.list_pop(&l)).await
    }

    async fn len(&self, list: &str) -> Result<usize, StoreError> {
        let l = list.to_string();
        self.with_db(move |db| db.list_len(&l)).await
    }

    async fn set_init(&self, key: &str, members: &[String]) -> Result<bool, StoreError> {
        let (k, m) = (key.to_string(), members.to_vec());
        self.with_db(move |db| db.set_init(&k, &m)).await
    }

    async fn set_add(&self, key: &str, members: &[String]) -> Result<(), StoreError> {
        let (k, m) = (key.to_string(), members.to_vec());
        self.with_db(move |db| db.set_add(&k, &m)).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let k = key.to_string();
        self.with_db(move |db| db.set_members(&k))
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        let (k, m) = (key.to_string(), member.to_string());
        self.with_db(move |db| db.zadd(&k, &m, score)).await
    }

    async fn zrange(&self, key: &str) -> Result<Vec<(String, f64)>, StoreError> {
        let k = key.to_string();
        self.with_db(move |db| db.zrange(&k)).await
    }

    async fn random_key(&self, pattern: &str) -> Result<String, StoreError> {
        let p = pattern.to_string();
        self.with_db(move |db| db.random_key(&p))
            .await?
            .ok_or_else(|| StoreError::NotFound(pattern.to_string()))
    }

    async fn count_keys(&self, pattern: &str) -> Result<usize, StoreError> {
        let p = pattern.to_string();
        self.with_db(move |db| db.count_keys(&p)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_keys_are_not_found() {
        let store = SqliteStore::open_memory().unwrap();
        assert!(store.get("nope").await.unwrap_err().is_not_found());
        assert!(store.set_members("nope").await.unwrap_err().is_not_found());
        assert!(store.random_key("nope:*").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn file_store_round_trips_a_queue() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("nested").join("graph.db")).unwrap();

        store.push("queue:events", "one").await.unwrap();
        store.push("queue:events", "two").await.unwrap();
        assert_eq!(store.len("queue:events").await.unwrap(), 2);
        assert_eq!(store.pop("queue:events").await.unwrap().as_deref(), Some("one"));
        assert_eq!(store.pop("queue:events").await.unwrap().as_deref(), Some("two"));
        assert_eq!(store.pop("queue:events").await.unwrap(), None);
    }
}
