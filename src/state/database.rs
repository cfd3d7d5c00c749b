//! SQLite database wrapper with WAL mode and a versioned schema.

use crate::state::schema;
use rusqlite::{params, Connection, OptionalExtension, Result};
use std::path::Path;
use tracing::info;

/// The cellgraph state database.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(std::time::Duration::from_millis(50))?;

        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Create the schema on first open; refuse files from a newer build.
    fn migrate(&mut self) -> Result<()> {
        let version = self.schema_version();

        if version == 0 {
            info!("Creating database schema v{}", schema::SCHEMA_VERSION);
            self.conn.execute_batch(schema::CREATE_SCHEMA)?;
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![schema::SCHEMA_VERSION],
            )?;
        } else if version > schema::SCHEMA_VERSION {
            return Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_MISMATCH),
                Some(format!(
                    "database schema v{version} is newer than supported v{}",
                    schema::SCHEMA_VERSION
                )),
            ));
        }

        Ok(())
    }

    /// Get the current schema version (0 if uninitialized).
    fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Key-value store
    // -----------------------------------------------------------------------

    /// Get a value from the KV store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
    }

    /// Set a value in the KV store (upsert).
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    /// Increment an integer counter, creating it at 1.
    pub fn kv_incr(&self, key: &str) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;
        let current: Option<String> = tx
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        let next = current
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0)
            + 1;
        tx.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, next.to_string()],
        )?;
        tx.commit()?;
        Ok(next)
    }

    /// Count KV keys and set keys matching a glob pattern.
    pub fn count_keys(&self, pattern: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM (SELECT key FROM kv UNION SELECT key FROM sets)
             WHERE key GLOB ?1",
            params![pattern],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Fetch one random KV or set key matching a glob pattern.
    pub fn random_key(&self, pattern: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT key FROM (SELECT key FROM kv UNION SELECT key FROM sets)
                 WHERE key GLOB ?1 ORDER BY RANDOM() LIMIT 1",
                params![pattern],
                |row| row.get(0),
            )
            .optional()
    }

    // -----------------------------------------------------------------------
    // Lists
    // -----------------------------------------------------------------------

    /// Append a value to the tail of a list.
    pub fn list_push(&self, name: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO lists (name, value) VALUES (?1, ?2)",
            params![name, value],
        )?;
        Ok(())
    }

    /// Remove and return the head of a list in one statement.
    pub fn list_pop(&self, name: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "DELETE FROM lists WHERE id = (
                    SELECT id FROM lists WHERE name = ?1 ORDER BY id LIMIT 1
                 ) RETURNING value",
                params![name],
                |row| row.get(0),
            )
            .optional()
    }

    /// Number of values waiting in a list.
    pub fn list_len(&self, name: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM lists WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // -----------------------------------------------------------------------
    // Sets
    // -----------------------------------------------------------------------

    /// Create a set with the given members unless one already exists.
    ///
    /// Returns `true` when this call created the set.
    pub fn set_init(&self, key: &str, members: &[String]) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let created = tx.execute("INSERT OR IGNORE INTO sets (key) VALUES (?1)", params![key])? > 0;
        if created {
            for member in members {
                tx.execute(
                    "INSERT OR IGNORE INTO set_members (key, member) VALUES (?1, ?2)",
                    params![key, member],
                )?;
            }
        }
        tx.commit()?;
        Ok(created)
    }

    /// Add members to a set, creating it if needed.
    pub fn set_add(&self, key: &str, members: &[String]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("INSERT OR IGNORE INTO sets (key) VALUES (?1)", params![key])?;
        for member in members {
            tx.execute(
                "INSERT OR IGNORE INTO set_members (key, member) VALUES (?1, ?2)",
                params![key, member],
            )?;
        }
        tx.commit()
    }

    /// Members of a set in insertion order, or `None` if the set was never created.
    pub fn set_members(&self, key: &str) -> Result<Option<Vec<String>>> {
        let exists: Option<String> = self
            .conn
            .query_row("SELECT key FROM sets WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        if exists.is_none() {
            return Ok(None);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT member FROM set_members WHERE key = ?1 ORDER BY rowid")?;
        let rows = stmt.query_map(params![key], |row| row.get(0))?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(Some(members))
    }

    // -----------------------------------------------------------------------
    // Sorted sets
    // -----------------------------------------------------------------------

    /// Add a member to a sorted set, replacing its score if present.
    pub fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO zsets (key, member, score) VALUES (?1, ?2, ?3)
             ON CONFLICT(key, member) DO UPDATE SET score = ?3",
            params![key, member, score],
        )?;
        Ok(())
    }

    /// All members of a sorted set, lowest score first.
    pub fn zrange(&self, key: &str) -> Result<Vec<(String, f64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT member, score FROM zsets WHERE key = ?1 ORDER BY score, member")?;
        let rows = stmt.query_map(params![key], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_pop_in_push_order() {
        let db = Database::open_memory().unwrap();
        db.list_push("q", "a").unwrap();
        db.list_push("q", "b").unwrap();
        db.list_push("other", "z").unwrap();

        assert_eq!(db.list_len("q").unwrap(), 2);
        assert_eq!(db.list_pop("q").unwrap().as_deref(), Some("a"));
        assert_eq!(db.list_pop("q").unwrap().as_deref(), Some("b"));
        assert_eq!(db.list_pop("q").unwrap(), None);
        assert_eq!(db.list_len("other").unwrap(), 1);
    }

    #[test]
    fn set_init_keeps_the_first_writer() {
        let db = Database::open_memory().unwrap();
        let first = vec!["a".to_string(), "b".to_string()];
        let second = vec!["c".to_string()];

        assert!(db.set_init("s", &first).unwrap());
        assert!(!db.set_init("s", &second).unwrap());
        assert_eq!(db.set_members("s").unwrap(), Some(first));
    }

    #[test]
    fn empty_set_is_distinct_from_missing() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.set_members("s").unwrap(), None);
        db.set_init("s", &[]).unwrap();
        assert_eq!(db.set_members("s").unwrap(), Some(vec![]));
    }

    #[test]
    fn counters_start_at_one() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.kv_incr("n").unwrap(), 1);
        assert_eq!(db.kv_incr("n").unwrap(), 2);
        assert_eq!(db.kv_get("n").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn glob_patterns_cover_kv_and_sets() {
        let db = Database::open_memory().unwrap();
        db.kv_set("behaviour:1:clg", "sum").unwrap();
        db.set_init("behaviour:1:connections", &[]).unwrap();
        db.kv_set("tree:9:first-behaviour", "1").unwrap();

        assert_eq!(db.count_keys("behaviour:*").unwrap(), 2);
        assert_eq!(
            db.random_key("*:connections").unwrap().as_deref(),
            Some("behaviour:1:connections")
        );
        assert_eq!(db.random_key("nothing:*").unwrap(), None);
    }

    #[test]
    fn zadd_replaces_scores() {
        let db = Database::open_memory().unwrap();
        db.zadd("z", "a", 2.0).unwrap();
        db.zadd("z", "b", 1.0).unwrap();
        db.zadd("z", "a", 0.5).unwrap();
        assert_eq!(
            db.zrange("z").unwrap(),
            vec![("a".to_string(), 0.5), ("b".to_string(), 1.0)]
        );
    }

    #[test]
    fn reopening_a_file_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        {
            let db = Database::open(&path).unwrap();
            db.kv_set("k", "v").unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.kv_get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn fresh_files_get_the_current_schema() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.schema_version(), schema::SCHEMA_VERSION);
    }

    #[test]
    fn files_from_a_newer_build_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        {
            let db = Database::open(&path).unwrap();
            db.conn
                .execute("UPDATE schema_version SET version = ?1", params![schema::SCHEMA_VERSION + 1])
                .unwrap();
        }
        assert!(Database::open(&path).is_err());
    }
}
