//! Durable FIFO queue on top of a `Store` list.
//!
//! Each pushed item is popped by exactly one worker: the store's pop is
//! atomic. Waiting dequeuers are woken by an in-process `Notify`; the poll
//! interval picks up items pushed by other processes.

use crate::error::StoreError;
use crate::state::Store;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct Queue {
    store: Arc<dyn Store>,
    name: String,
    notify: Arc<Notify>,
    poll_interval: Duration,
}

impl Queue {
    pub fn new(store: Arc<dyn Store>, name: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            store,
            name: name.into(),
            notify: Arc::new(Notify::new()),
            poll_interval,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append an item and wake one waiting dequeuer.
    pub async fn push<T: Serialize>(&self, item: &T) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(item)?;
        self.store.push(&self.name, &encoded).await?;
        self.notify.notify_one();
        Ok(())
    }

    /// Pop the head item if there is one.
    pub async fn try_pop<T: DeserializeOwned>(&self) -> Result<Option<T>, StoreError> {
        match self.store.pop(&self.name).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Wait for the next item. Returns `None` once `cancel` fires.
    pub async fn pop<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, StoreError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            if let Some(item) = self.try_pop().await? {
                return Ok(Some(item));
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    pub async fn len(&self) -> Result<usize, StoreError> {
        self.store.len(&self.name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStore;

    fn queue() -> Queue {
        Queue::new(Arc::new(MemoryStore::new()), "q", Duration::from_millis(10))
    }

    #[tokio::test]
    async fn pop_waits_for_a_push() {
        let q = queue();
        let cancel = CancellationToken::new();

        let waiter = {
            let q = q.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { q.pop::<String>(&cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.push(&"hello".to_string()).await.unwrap();

        let got = waiter.await.unwrap().unwrap();
        assert_eq!(got.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn cancellation_releases_waiters() {
        let q = queue();
        let cancel = CancellationToken::new();
        let waiter = {
            let q = q.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { q.pop::<String>(&cancel).await })
        };
        cancel.cancel();
        assert_eq!(waiter.await.unwrap().unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn each_item_goes_to_one_consumer() {
        let q = queue();
        for i in 0..50u32 {
            q.push(&i).await.unwrap();
        }
        let mut consumers = Vec::new();
        for _ in 0..4 {
            let q = q.clone();
            consumers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(i) = q.try_pop::<u32>().await.unwrap() {
                    seen.push(i);
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for c in consumers {
            all.extend(c.await.unwrap());
        }
        all.sort();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
        assert_eq!(q.len().await.unwrap(), 0);
    }
}
