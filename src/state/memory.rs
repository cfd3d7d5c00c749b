//! In-memory `Store`.
//!
//! Uses plain `HashMap`s behind a single `RwLock`, which gives every
//! operation single-key atomicity. Nothing survives a restart.

use crate::error::StoreError;
use crate::state::{glob_match, Store};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    kv: HashMap<String, String>,
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, Vec<String>>,
    zsets: HashMap<String, HashMap<String, f64>>,
}

impl Inner {
    fn keys_matching(&self, pattern: &str) -> Vec<&String> {
        let mut keys: Vec<&String> = self
            .kv
            .keys()
            .chain(self.sets.keys())
            .filter(|k| glob_match(pattern, k))
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

/// Volatile store for tests and throwaway runs.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<String, StoreError> {
        let inner = self.inner.read().await;
        inner
            .kv
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.kv.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut inner = self.inner.write().await;
        let next = inner
            .kv
            .get(key)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0)
            + 1;
        inner.kv.insert(key.to_string(), next.to_string());
        Ok(next)
    }

    async fn push(&self, list: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner
            .lists
            .entry(list.to_string())
            .or_default()
            .push_back(value.to_string());
        Ok(())
    }

    async fn pop(&self, list: &str) -> Result<Option<String>, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.lists.get_mut(list).and_then(|l| l.pop_front()))
    }

    async fn len(&self, list: &str) -> Result<usize, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.lists.get(list).map_or(0, |l| l.len()))
    }

    async fn set_init(&self, key: &str, members: &[String]) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.sets.contains_key(key) {
            return Ok(false);
        }
        let mut unique: Vec<String> = Vec::with_capacity(members.len());
        for m in members {
            if !unique.contains(m) {
                unique.push(m.clone());
            }
        }
        inner.sets.insert(key.to_string(), unique);
        Ok(true)
    }

    async fn set_add(&self, key: &str, members: &[String]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let set = inner.sets.entry(key.to_string()).or_default();
        for m in members {
            if !set.contains(m) {
                set.push(m.clone());
            }
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.read().await;
        inner
            .sets
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner
            .zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zrange(&self, key: &str) -> Result<Vec<(String, f64)>, StoreError> {
        let inner = self.inner.read().await;
        let mut members: Vec<(String, f64)> = inner
            .zsets
            .get(key)
            .map(|z| z.iter().map(|(m, s)| (m.clone(), *s)).collect())
            .unwrap_or_default();
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(members)
    }

    async fn random_key(&self, pattern: &str) -> Result<String, StoreError> {
        let inner = self.inner.read().await;
        inner
            .keys_matching(pattern)
            .choose(&mut rand::thread_rng())
            .map(|k| (*k).clone())
            .ok_or_else(|| StoreError::NotFound(pattern.to_string()))
    }

    async fn count_keys(&self, pattern: &str) -> Result<usize, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.keys_matching(pattern).len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_init_is_first_writer_wins() {
        let store = MemoryStore::new();
        let a = vec!["a".to_string()];
        let b = vec!["b".to_string()];

        assert!(store.set_init("s", &a).await.unwrap());
        assert!(!store.set_init("s", &b).await.unwrap());
        assert_eq!(store.set_members("s").await.unwrap(), a);
    }

    #[tokio::test]
    async fn empty_set_exists_once_created() {
        let store = MemoryStore::new();
        assert!(store.set_members("s").await.unwrap_err().is_not_found());
        store.set_init("s", &[]).await.unwrap();
        assert!(store.set_members("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lists_are_fifo() {
        let store = MemoryStore::new();
        store.push("q", "1").await.unwrap();
        store.push("q", "2").await.unwrap();
        assert_eq!(store.pop("q").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.len("q").await.unwrap(), 1);
        assert_eq!(store.pop("q").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.pop("q").await.unwrap(), None);
        assert_eq!(store.pop("never").await.unwrap(), None);
    }

    #[tokio::test]
    async fn random_key_only_returns_matches() {
        let store = MemoryStore::new();
        store.set("behaviour:1:clg", "sum").await.unwrap();
        store.set("tree:1:first-behaviour", "1").await.unwrap();
        for _ in 0..10 {
            assert_eq!(store.random_key("behaviour:*").await.unwrap(), "behaviour:1:clg");
        }
        assert_eq!(store.count_keys("*").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn zrange_orders_by_score() {
        let store = MemoryStore::new();
        store.zadd("z", "late", 20.0).await.unwrap();
        store.zadd("z", "early", 10.0).await.unwrap();
        let members: Vec<String> = store
            .zrange("z")
            .await
            .unwrap()
            .into_iter()
            .map(|(m, _)| m)
            .collect();
        assert_eq!(members, vec!["early", "late"]);
    }
}
