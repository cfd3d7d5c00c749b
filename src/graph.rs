//! The persisted connection graph.
//!
//! Everything the engine learns lives under a handful of keys:
//!
//! | key                                      | kind    | holds                          |
//! |------------------------------------------|---------|--------------------------------|
//! | `behaviour:<id>:connections`             | set     | successor behaviour ids        |
//! | `behaviour:<id>:clg`                     | string  | cell bound to the behaviour    |
//! | `tree:<id>:first-behaviour`              | string  | entry behaviour of a tree      |
//! | `tree:<id>:retraversals`                 | counter | restarts after a miss          |
//! | `tree:<id>:pass:<n>:misses`              | counter | misses seen in walk `n`        |
//! | `tree:<id>:done`                         | counter | set once a result is emitted   |
//! | `tree:<id>:trace`                        | zset    | exercised `source>dest` edges  |
//! | `information:<id>:sequence`              | string  | original input text            |
//! | `information-sequence:<text>:id`         | string  | information id for a text      |
//! | `information:<id>:entry:<cell>`          | string  | stable entry behaviour         |
//! | `session:<id>:outputs`                   | list    | emitted results                |

use crate::error::StoreError;
use crate::state::Store;
use std::sync::Arc;

pub mod keys {
    pub const INPUT_QUEUE: &str = "queue:inputs";
    pub const EVENT_QUEUE: &str = "queue:events";
    pub const SEPARATOR: &str = "config:separator";

    pub fn connections(behaviour_id: &str) -> String {
        format!("behaviour:{behaviour_id}:connections")
    }

    pub fn binding(behaviour_id: &str) -> String {
        format!("behaviour:{behaviour_id}:clg")
    }

    pub fn first_behaviour(tree_id: &str) -> String {
        format!("tree:{tree_id}:first-behaviour")
    }

    pub fn retraversals(tree_id: &str) -> String {
        format!("tree:{tree_id}:retraversals")
    }

    pub fn pass_misses(tree_id: &str, pass: i64) -> String {
        format!("tree:{tree_id}:pass:{pass}:misses")
    }

    pub fn done(tree_id: &str) -> String {
        format!("tree:{tree_id}:done")
    }

    pub fn trace(tree_id: &str) -> String {
        format!("tree:{tree_id}:trace")
    }

    pub fn information(information_id: &str) -> String {
        format!("information:{information_id}:sequence")
    }

    pub fn information_id(text: &str) -> String {
        format!("information-sequence:{text}:id")
    }

    pub fn entry(information_id: &str, cell: &str) -> String {
        format!("information:{information_id}:entry:{cell}")
    }

    pub fn session_outputs(session_id: &str) -> String {
        format!("session:{session_id}:outputs")
    }
}

/// Typed access to the learned graph on top of a `Store`.
#[derive(Clone)]
pub struct Graph {
    store: Arc<dyn Store>,
}

impl Graph {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Connections
    // -----------------------------------------------------------------------

    /// The persisted successors of a producer, or `None` if it was never explored.
    pub async fn connections(&self, producer: &str) -> Result<Option<Vec<String>>, StoreError> {
        match self.store.set_members(&keys::connections(producer)).await {
            Ok(members) => Ok(Some(members)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Persist a producer's successors unless a set already exists, then
    /// return whichever set is stored.
    pub async fn init_connections(
        &self,
        producer: &str,
        successors: &[String],
    ) -> Result<Vec<String>, StoreError> {
        let key = keys::connections(producer);
        self.store.set_init(&key, successors).await?;
        self.store.set_members(&key).await
    }

    /// Bind a behaviour to the cell it runs.
    pub async fn bind(&self, behaviour_id: &str, cell: &str) -> Result<(), StoreError> {
        self.store.set(&keys::binding(behaviour_id), cell).await
    }

    pub async fn binding(&self, behaviour_id: &str) -> Result<String, StoreError> {
        self.store.get(&keys::binding(behaviour_id)).await
    }

    /// Bind every successor and persist the producer's set in one go.
    pub async fn connect(
        &self,
        producer: &str,
        successors: &[(&str, &str)],
    ) -> Result<Vec<String>, StoreError> {
        for (id, cell) in successors {
            self.bind(id, cell).await?;
        }
        let ids: Vec<String> = successors.iter().map(|(id, _)| id.to_string()).collect();
        self.init_connections(producer, &ids).await
    }

    // -----------------------------------------------------------------------
    // Trees
    // -----------------------------------------------------------------------

    pub async fn anchor_tree(&self, tree_id: &str, first_behaviour: &str) -> Result<(), StoreError> {
        self.store.set(&keys::first_behaviour(tree_id), first_behaviour).await
    }

    pub async fn first_behaviour(&self, tree_id: &str) -> Result<String, StoreError> {
        self.store.get(&keys::first_behaviour(tree_id)).await
    }

    /// Claim the tree's single emission. Only the first caller gets `true`.
    pub async fn complete_tree(&self, tree_id: &str) -> Result<bool, StoreError> {
        Ok(self.store.incr(&keys::done(tree_id)).await? == 1)
    }

    pub async fn is_complete(&self, tree_id: &str) -> Result<bool, StoreError> {
        match self.store.get(&keys::done(tree_id)).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Count a miss within one walk of the tree and return the running total.
    pub async fn record_miss(&self, tree_id: &str, pass: i64) -> Result<i64, StoreError> {
        self.store.incr(&keys::pass_misses(tree_id, pass)).await
    }

    /// Count one more restart of the tree.
    pub async fn record_retraversal(&self, tree_id: &str) -> Result<i64, StoreError> {
        self.store.incr(&keys::retraversals(tree_id)).await
    }

    pub async fn retraversals(&self, tree_id: &str) -> Result<i64, StoreError> {
        match self.store.get(&keys::retraversals(tree_id)).await {
            Ok(v) => Ok(v.parse().unwrap_or(0)),
            Err(e) if e.is_not_found() => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Exercised edges of a tree, oldest first.
    pub async fn trace(&self, tree_id: &str) -> Result<Vec<String>, StoreError> {
        let members = self.store.zrange(&keys::trace(tree_id)).await?;
        Ok(members.into_iter().map(|(m, _)| m).collect())
    }

    // -----------------------------------------------------------------------
    // Information
    // -----------------------------------------------------------------------

    /// Id of the information record for `text`, creating it on first sight.
    pub async fn information_id_for(&self, text: &str) -> Result<String, StoreError> {
        let key = keys::information_id(text);
        match self.store.get(&key).await {
            Ok(id) => return Ok(id),
            Err(e) if !e.is_not_found() => return Err(e),
            Err(_) => {}
        }

        let id = ulid::Ulid::new().to_string();
        self.store.set(&keys::information(&id), text).await?;
        self.store.set(&key, &id).await?;
        Ok(id)
    }

    pub async fn information(&self, information_id: &str) -> Result<String, StoreError> {
        self.store.get(&keys::information(information_id)).await
    }

    /// The stable entry behaviour for an information record and entry cell.
    ///
    /// Re-submitting the same text lands on the same behaviour, so its
    /// learned routes are replayed.
    pub async fn entry_behaviour(&self, information_id: &str, cell: &str) -> Result<String, StoreError> {
        let key = keys::entry(information_id, cell);
        match self.store.get(&key).await {
            Ok(id) => return Ok(id),
            Err(e) if !e.is_not_found() => return Err(e),
            Err(_) => {}
        }

        let id = ulid::Ulid::new().to_string();
        self.bind(&id, cell).await?;
        self.store.set(&key, &id).await?;
        Ok(id)
    }
}
