//! Tracking: remember which edges a tree actually exercised.

use crate::error::StoreError;
use crate::graph::keys;
use crate::network::Payload;
use crate::state::Store;
use std::sync::Arc;

/// Producer recorded for payloads that came straight from a submission.
const SUBMISSION_SOURCE: &str = "submission";

pub struct Tracker {
    store: Arc<dyn Store>,
}

impl Tracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Record `source>destination` in the tree's trace, scored by time.
    pub async fn track(&self, payload: &Payload) -> Result<(), StoreError> {
        let Some(tree_id) = payload.context.tree_id() else {
            return Ok(());
        };
        let source = payload.source().unwrap_or(SUBMISSION_SOURCE);
        let edge = format!("{source}>{}", payload.destination);
        let score = chrono::Utc::now().timestamp_millis() as f64;
        self.store.zadd(&keys::trace(tree_id), &edge, score).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::network::Context;
    use crate::state::MemoryStore;

    #[tokio::test]
    async fn edges_land_in_the_tree_trace() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let tracker = Tracker::new(store.clone());

        let mut ctx = Context::new();
        ctx.set_tree_id("t1");
        tracker
            .track(&Payload::new(vec![], ctx, "b1", vec![]))
            .await
            .unwrap();

        let mut ctx = Context::new();
        ctx.set_tree_id("t1");
        tracker
            .track(&Payload::new(vec![], ctx, "b2", vec!["b1".into()]))
            .await
            .unwrap();

        let trace = Graph::new(store).trace("t1").await.unwrap();
        assert!(trace.contains(&"submission>b1".to_string()));
        assert!(trace.contains(&"b1>b2".to_string()));
    }

    #[tokio::test]
    async fn payloads_without_a_tree_are_ignored() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let tracker = Tracker::new(store.clone());
        tracker
            .track(&Payload::new(vec![], Context::new(), "b1", vec![]))
            .await
            .unwrap();
        assert_eq!(store.count_keys("*").await.unwrap(), 0);
    }
}
