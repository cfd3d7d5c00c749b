//! Database schema definitions.

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Full DDL for the cellgraph store.
pub const CREATE_SCHEMA: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

-- Plain string keys: cell bindings, tree anchors, information records, counters
CREATE TABLE IF NOT EXISTS kv (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- FIFO lists: the durable input/event queues and session outputs
CREATE TABLE IF NOT EXISTS lists (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT NOT NULL,
    value      TEXT NOT NULL,
    pushed_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Set headers; a row exists even for an empty set
CREATE TABLE IF NOT EXISTS sets (
    key        TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Set members, ordered by insertion
CREATE TABLE IF NOT EXISTS set_members (
    key    TEXT NOT NULL REFERENCES sets(key),
    member TEXT NOT NULL,
    PRIMARY KEY (key, member)
);

-- Sorted sets: exercised-path traces
CREATE TABLE IF NOT EXISTS zsets (
    key    TEXT NOT NULL,
    member TEXT NOT NULL,
    score  REAL NOT NULL,
    PRIMARY KEY (key, member)
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_lists_name ON lists(name, id);
CREATE INDEX IF NOT EXISTS idx_zsets_score ON zsets(key, score);
"#;
