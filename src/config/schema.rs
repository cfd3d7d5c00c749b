//! Configuration schema for cellgraph.toml.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the SQLite store.
    pub db_path: String,

    /// Log level (debug, info, warn, error).
    pub log_level: String,

    /// Workers draining the event queue.
    pub event_workers: usize,

    /// Workers draining the input queue.
    pub input_workers: usize,

    /// Upper bound on successors minted per Explore step.
    pub max_signals: usize,

    /// Fixed seed for exploration draws. Entropy when absent.
    pub rng_seed: Option<u64>,

    /// Fallback poll period for blocking dequeues, in milliseconds.
    pub poll_interval_ms: u64,

    /// Storage attempts per call, including the first.
    pub retry_max_attempts: u32,

    pub retry_base_delay_ms: u64,

    pub retry_max_delay_ms: u64,

    /// Retraversals allowed per tree before giving up. 0 means unbounded.
    pub max_retraversals: u32,

    /// Buffered engine events per subscriber.
    pub event_capacity: usize,

    /// Separator used by `split-features` when the store holds none.
    pub separator: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: "~/.cellgraph/graph.db".into(),
            log_level: "info".into(),
            event_workers: 10,
            input_workers: 1,
            max_signals: 5,
            rng_seed: None,
            poll_interval_ms: 250,
            retry_max_attempts: 5,
            retry_base_delay_ms: 20,
            retry_max_delay_ms: 2000,
            max_retraversals: 0,
            event_capacity: 1024,
            separator: " ".into(),
        }
    }
}

impl EngineConfig {
    /// Resolve a path that may contain `~` to an absolute path.
    pub fn resolve_path(&self, path: &str) -> String {
        shellexpand::tilde(path).into_owned()
    }

    /// Resolved database path.
    pub fn resolved_db_path(&self) -> String {
        self.resolve_path(&self.db_path)
    }

    /// Reject settings the engine cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_workers == 0 {
            return Err(ConfigError::Invalid("event_workers must be at least 1".into()));
        }
        if self.input_workers == 0 {
            return Err(ConfigError::Invalid("input_workers must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive".into()));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "retry_base_delay_ms ({}) exceeds retry_max_delay_ms ({})",
                self.retry_base_delay_ms, self.retry_max_delay_ms
            )));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be positive".into()));
        }
        Ok(())
    }
}
