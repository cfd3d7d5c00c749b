//! Bounded exponential backoff around any `Store`.
//!
//! Only `StoreError::Transient` is retried. Not-found and backend failures
//! surface immediately.

use crate::config::EngineConfig;
use crate::error::StoreError;
use crate::state::Store;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// Retry schedule for storage calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_attempts: config.retry_max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let pow = attempt.saturating_sub(1).min(31);
        let millis = (self.base_delay.as_millis() as u64).saturating_mul(2u64.saturating_pow(pow));
        Duration::from_millis(millis).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        op = op_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transient storage failure, backing off: {e}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_transient() => {
                    error!(op = op_name, attempt, "Storage retries exhausted: {e}");
                    return Err(e);
                }
                other => return other,
            }
        }
    }
}

/// A `Store` whose every call goes through a `RetryPolicy`.
pub struct RetryStore {
    inner: Arc<dyn Store>,
    policy: RetryPolicy,
}

impl RetryStore {
    pub fn new(inner: Arc<dyn Store>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Store for RetryStore {
    async fn get(&self, key: &str) -> Result<String, StoreError> {
        let inner = &self.inner;
        self.policy.run("get", move || inner.get(key)).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let inner = &self.inner;
        self.policy.run("set", move || inner.set(key, value)).await
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let inner = &self.inner;
        self.policy.run("incr", move || inner.incr(key)).await
    }

    async fn push(&self, list: &str, value: &str) -> Result<(), StoreError> {
        let inner = &self.inner;
        self.policy.run("push", move || inner.push(list, value)).await
    }

    async fn pop(&self, list: &str) -> Result<Option<String>, StoreError> {
        let inner = &self.inner;
        self.policy.run("pop", move || inner.pop(list)).await
    }

    async fn len(&self, list: &str) -> Result<usize, StoreError> {
        let inner = &self.inner;
        self.policy.run("len", move || inner.len(list)).await
    }

    async fn set_init(&self, key: &str, members: &[String]) -> Result<bool, StoreError> {
        let inner = &self.inner;
        self.policy.run("set_init", move || inner.set_init(key, members)).await
    }

    async fn set_add(&self, key: &str, members: &[String]) -> Result<(), StoreError> {
        let inner = &self.inner;
        self.policy.run("set_add", move || inner.set_add(key, members)).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let inner = &self.inner;
        self.policy.run("set_members", move || inner.set_members(key)).await
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        let inner = &self.inner;
        self.policy.run("zadd", move || inner.zadd(key, member, score)).await
    }

    async fn zrange(&self, key: &str) -> Result<Vec<(String, f64)>, StoreError> {
        let inner = &self.inner;
        self.policy.run("zrange", move || inner.zrange(key)).await
    }

    async fn random_key(&self, pattern: &str) -> Result<String, StoreError> {
        let inner = &self.inner;
        self.policy.run("random_key", move || inner.random_key(pattern)).await
    }

    async fn count_keys(&self, pattern: &str) -> Result<usize, StoreError> {
        let inner = &self.inner;
        self.policy.run("count_keys", move || inner.count_keys(pattern)).await
    }
}
