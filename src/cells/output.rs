//! The terminal output cell and the expectation loop.
//!
//! A result with no expectation, or one that matches it, is delivered to the
//! session and answers the tree; nothing from that tree is delivered again.
//! The first mismatch in a walk sends the original text back to the tree's
//! first behaviour so the tree is walked again.

use crate::cell::{Cell, Signature, Value, ValueKind};
use crate::engine::{Queue, Wiring};
use crate::error::CellError;
use crate::graph::{keys, Graph};
use crate::network::{Context, Payload};
use crate::types::{EngineEvent, OUTPUT_CELL};
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info};

pub struct OutputCell {
    graph: Graph,
    queue: Queue,
    events: broadcast::Sender<EngineEvent>,
    max_retraversals: i64,
    signature: Signature,
}

impl OutputCell {
    pub fn new(wiring: &Wiring) -> Self {
        Self {
            graph: wiring.graph.clone(),
            queue: wiring.events_queue.clone(),
            events: wiring.events.clone(),
            max_retraversals: i64::from(wiring.config.max_retraversals),
            signature: Signature::new(vec![ValueKind::Any], vec![]),
        }
    }

    /// Deliver a result. A tree answers at most once; later results are dropped.
    async fn emit(&self, ctx: &Context, output: String) -> Result<(), CellError> {
        let session_id = ctx.session_id().ok_or(CellError::MissingContext("session id"))?;
        let tree_id = ctx.tree_id().unwrap_or_default();

        if !tree_id.is_empty() && !self.graph.complete_tree(tree_id).await? {
            debug!(tree = tree_id, "Tree already answered, dropping result");
            return Ok(());
        }

        self.graph
            .store()
            .push(&keys::session_outputs(session_id), &output)
            .await?;
        info!(session = session_id, tree = tree_id, output = %output, "Result emitted");
        let _ = self.events.send(EngineEvent::Emitted {
            session_id: session_id.to_string(),
            tree_id: tree_id.to_string(),
            output,
        });
        Ok(())
    }

    /// Re-enqueue the original text at the tree's first behaviour.
    ///
    /// Only the first miss of a walk restarts the tree; later misses in the
    /// same walk return `None`.
    async fn retraverse(&self, ctx: &Context, tree_id: &str) -> Result<Option<i64>, CellError> {
        let pass = ctx.pass();
        if self.graph.record_miss(tree_id, pass).await? > 1 {
            debug!(tree = tree_id, pass, "Walk already restarted");
            return Ok(None);
        }

        let attempt = self.graph.record_retraversal(tree_id).await?;
        if self.max_retraversals > 0 && attempt > self.max_retraversals {
            return Err(CellError::RetraversalBudgetExhausted {
                tree_id: tree_id.to_string(),
                attempts: attempt - 1,
            });
        }

        let information_id = ctx
            .information_id()
            .ok_or(CellError::MissingContext("information id"))?;
        let original = self.graph.information(information_id).await?;
        let first = self.graph.first_behaviour(tree_id).await?;
        let entry_cell = self.graph.binding(&first).await?;

        let mut context = ctx.fork();
        context.set_behaviour_id(first.as_str());
        context.set_clg_name(entry_cell);
        context.set_pass(pass + 1);

        let sources = ctx.behaviour_id().map(str::to_string).into_iter().collect();
        let payload = Payload::new(vec![Value::Text(original)], context, first.as_str(), sources);
        self.queue.push(&payload).await?;

        debug!(tree = tree_id, behaviour = %first, attempt, "Tree re-entered");
        Ok(Some(attempt))
    }
}

#[async_trait]
impl Cell for OutputCell {
    fn name(&self) -> &str {
        OUTPUT_CELL
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn terminal(&self) -> bool {
        true
    }

    async fn call(&self, ctx: &Context, args: Vec<Value>) -> Result<Vec<Value>, CellError> {
        let output = args
            .first()
            .map(Value::to_string)
            .ok_or_else(|| CellError::domain(OUTPUT_CELL, "nothing to output"))?;

        if let Some(tree_id) = ctx.tree_id() {
            if self.graph.is_complete(tree_id).await? {
                debug!(tree = tree_id, "Tree already answered");
                return Ok(vec![]);
            }
        }

        match ctx.expectation() {
            Some(expected) if expected != output => {
                let tree_id = ctx.tree_id().ok_or(CellError::MissingContext("tree id"))?;
                match self.retraverse(ctx, tree_id).await? {
                    Some(attempt) => Err(CellError::ExpectationNotMet {
                        tree_id: tree_id.to_string(),
                        attempt,
                    }),
                    None => Ok(vec![]),
                }
            }
            _ => {
                self.emit(ctx, output).await?;
                Ok(vec![])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::state::{MemoryStore, Store};
    use std::sync::Arc;
    use std::time::Duration;

    struct Fixture {
        wiring: Wiring,
        store: Arc<dyn Store>,
    }

    fn fixture(max_retraversals: u32) -> Fixture {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let (events, _) = broadcast::channel(16);
        let config = EngineConfig {
            max_retraversals,
            ..EngineConfig::default()
        };
        Fixture {
            wiring: Wiring {
                config,
                graph: Graph::new(store.clone()),
                events_queue: Queue::new(store.clone(), keys::EVENT_QUEUE, Duration::from_millis(10)),
                events,
            },
            store,
        }
    }

    /// Context of a tree that entered through the input cell on "3 4".
    async fn tree_context(f: &Fixture, expectation: Option<&str>) -> Context {
        let graph = &f.wiring.graph;
        let info = graph.information_id_for("3 4").await.unwrap();
        let first = graph.entry_behaviour(&info, "input").await.unwrap();
        graph.anchor_tree("t1", &first).await.unwrap();

        let mut ctx = Context::new();
        ctx.set_behaviour_id("out");
        ctx.set_clg_name(OUTPUT_CELL);
        ctx.set_tree_id("t1");
        ctx.set_session_id("s1");
        ctx.set_information_id(info);
        ctx.set_expectation(expectation.map(str::to_string));
        ctx
    }

    #[tokio::test]
    async fn emits_without_an_expectation() {
        let f = fixture(0);
        let mut events = f.wiring.events.subscribe();
        let cell = OutputCell::new(&f.wiring);
        let ctx = tree_context(&f, None).await;

        assert!(cell.call(&ctx, vec![Value::Int(7)]).await.unwrap().is_empty());
        assert_eq!(f.store.pop(&keys::session_outputs("s1")).await.unwrap().as_deref(), Some("7"));
        assert!(matches!(events.recv().await.unwrap(), EngineEvent::Emitted { output, .. } if output == "7"));
    }

    #[tokio::test]
    async fn emits_on_a_match() {
        let f = fixture(0);
        let cell = OutputCell::new(&f.wiring);
        let ctx = tree_context(&f, Some("7")).await;
        cell.call(&ctx, vec![Value::Int(7)]).await.unwrap();
        assert_eq!(f.store.len(&keys::session_outputs("s1")).await.unwrap(), 1);
        assert_eq!(f.wiring.events_queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn a_miss_reenters_the_tree() {
        let f = fixture(0);
        let cell = OutputCell::new(&f.wiring);
        let ctx = tree_context(&f, Some("8")).await;

        let err = cell.call(&ctx, vec![Value::Int(7)]).await.unwrap_err();
        assert!(matches!(err, CellError::ExpectationNotMet { attempt: 1, .. }));
        assert_eq!(f.store.len(&keys::session_outputs("s1")).await.unwrap(), 0);

        let payload: Payload = f.wiring.events_queue.try_pop().await.unwrap().unwrap();
        let first = f.wiring.graph.first_behaviour("t1").await.unwrap();
        assert_eq!(payload.destination, first);
        assert_eq!(payload.args, vec![Value::from("3 4")]);
        assert_eq!(payload.context.clg_name(), Some("input"));
        assert_eq!(payload.context.expectation(), Some("8"));
        assert_eq!(payload.source(), Some("out"));
        assert_eq!(payload.context.pass(), 1);
    }

    #[tokio::test]
    async fn one_restart_per_walk() {
        let f = fixture(0);
        let cell = OutputCell::new(&f.wiring);
        let ctx = tree_context(&f, Some("8")).await;

        assert!(cell.call(&ctx, vec![Value::Int(7)]).await.is_err());
        assert!(cell.call(&ctx, vec![Value::Int(12)]).await.unwrap().is_empty());
        assert_eq!(f.wiring.events_queue.len().await.unwrap(), 1);
        assert_eq!(f.wiring.graph.retraversals("t1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn an_answered_tree_neither_emits_again_nor_restarts() {
        let f = fixture(0);
        let cell = OutputCell::new(&f.wiring);
        let ctx = tree_context(&f, Some("7")).await;

        cell.call(&ctx, vec![Value::Int(7)]).await.unwrap();
        assert!(cell.call(&ctx, vec![Value::Int(12)]).await.unwrap().is_empty());

        let mut next_walk = ctx.fork();
        next_walk.set_pass(1);
        cell.call(&next_walk, vec![Value::Int(7)]).await.unwrap();

        assert_eq!(f.store.len(&keys::session_outputs("s1")).await.unwrap(), 1);
        assert_eq!(f.wiring.events_queue.len().await.unwrap(), 0);
        assert_eq!(f.wiring.graph.retraversals("t1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn budget_stops_the_loop() {
        let f = fixture(2);
        let cell = OutputCell::new(&f.wiring);
        let mut ctx = tree_context(&f, Some("8")).await;

        for attempt in 1..=2 {
            let err = cell.call(&ctx, vec![Value::Int(7)]).await.unwrap_err();
            assert!(matches!(err, CellError::ExpectationNotMet { attempt: a, .. } if a == attempt));
            ctx.set_pass(attempt);
        }
        let err = cell.call(&ctx, vec![Value::Int(7)]).await.unwrap_err();
        assert!(matches!(err, CellError::RetraversalBudgetExhausted { attempts: 2, .. }));
        assert_eq!(f.wiring.events_queue.len().await.unwrap(), 2);
    }
}
