//! Persistence: the `Store` contract and its backends.
//!
//! The engine touches shared state only through `Store`. Every operation is
//! atomic on a single key; nothing spans keys. A missing key is reported as
//! `StoreError::NotFound` so callers can tell "nothing learned yet" apart
//! from a failure.

pub mod database;
pub mod memory;
pub mod retry;
pub mod schema;
pub mod sqlite;

pub use database::Database;
pub use memory::MemoryStore;
pub use retry::{RetryPolicy, RetryStore};
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use async_trait::async_trait;

/// Key/value, list, set and sorted-set storage.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read a string value.
    async fn get(&self, key: &str) -> Result<String, StoreError>;

    /// Write a string value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Increment an integer counter and return the new value.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Append to the tail of a list.
    async fn push(&self, list: &str, value: &str) -> Result<(), StoreError>;

    /// Remove and return the head of a list without waiting.
    async fn pop(&self, list: &str) -> Result<Option<String>, StoreError>;

    /// Number of values in a list.
    async fn len(&self, list: &str) -> Result<usize, StoreError>;

    /// Create a set holding `members` unless the key already holds one.
    ///
    /// Returns `true` if this call created the set. An empty `members`
    /// slice still creates the set.
    async fn set_init(&self, key: &str, members: &[String]) -> Result<bool, StoreError>;

    /// Add members to a set, creating it if needed.
    async fn set_add(&self, key: &str, members: &[String]) -> Result<(), StoreError>;

    /// Members of a set in insertion order.
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Add a member to a sorted set, replacing its score.
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError>;

    /// Members of a sorted set, lowest score first.
    async fn zrange(&self, key: &str) -> Result<Vec<(String, f64)>, StoreError>;

    /// One random key (plain or set) matching a glob pattern.
    async fn random_key(&self, pattern: &str) -> Result<String, StoreError>;

    /// Number of keys (plain or set) matching a glob pattern.
    async fn count_keys(&self, pattern: &str) -> Result<usize, StoreError>;
}

/// Glob matching with `*` and `?`, the same subset SQLite's `GLOB` uses here.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::glob_match;

    #[test]
    fn glob_matches_stars_and_marks() {
        assert!(glob_match("behaviour:*:connections", "behaviour:01H:connections"));
        assert!(glob_match("*", ""));
        assert!(glob_match("tree:?:x", "tree:1:x"));
        assert!(!glob_match("tree:?:x", "tree:12:x"));
        assert!(!glob_match("behaviour:*", "tree:1"));
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(!glob_match("a*b*c", "aXXbYY"));
    }
}
