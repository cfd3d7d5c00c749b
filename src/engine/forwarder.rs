//! Forwarding: pick the next cell-instances for a computed payload.
//!
//! The first time a producer forwards, it explores: a random number of fresh
//! behaviour ids is minted, each bound to a randomly chosen cell that accepts
//! the payload, and the set is persisted. Every later forward from the same
//! producer reuses that set. Concurrent first forwards race on `set_init`;
//! all of them continue with whichever set was stored.

use crate::cell::{Cell, Registry, Value};
use crate::engine::queue::Queue;
use crate::error::{EngineError, StoreError};
use crate::graph::Graph;
use crate::network::Payload;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use tracing::debug;

pub struct Forwarder {
    graph: Graph,
    registry: Arc<Registry>,
    queue: Queue,
    rng: Mutex<StdRng>,
    max_signals: usize,
}

impl Forwarder {
    pub fn new(
        graph: Graph,
        registry: Arc<Registry>,
        queue: Queue,
        max_signals: usize,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            graph,
            registry,
            queue,
            rng: Mutex::new(rng),
            max_signals,
        }
    }

    /// Enqueue one payload per successor of the payload's behaviour.
    ///
    /// Returns the number of successors; zero is a legal dead end. Each
    /// successor is enqueued only after the connection set is persisted.
    pub async fn forward(&self, cell: &dyn Cell, payload: &Payload) -> Result<usize, EngineError> {
        let producer = payload
            .context
            .behaviour_id()
            .ok_or(EngineError::MissingContext("behaviour id"))?;

        let successors = match self.graph.connections(producer).await? {
            Some(existing) => {
                debug!(behaviour = producer, cell = cell.name(), count = existing.len(), "Reusing connections");
                existing
            }
            None => {
                let explored = self.explore(producer, &payload.args).await?;
                debug!(behaviour = producer, cell = cell.name(), count = explored.len(), "Explored connections");
                explored
            }
        };

        for id in &successors {
            let clg = self.graph.binding(id).await?;
            let mut context = payload.context.fork();
            context.set_behaviour_id(id.as_str());
            context.set_clg_name(clg);

            let next = Payload::new(payload.args.clone(), context, id.as_str(), vec![producer.to_string()]);
            self.queue.push(&next).await?;
        }

        Ok(successors.len())
    }

    /// Mint, bind and persist a connection set for a never-seen producer.
    async fn explore(&self, producer: &str, args: &[Value]) -> Result<Vec<String>, StoreError> {
        let candidates = self.registry.candidates(args);
        let minted = self.draw(&candidates);

        // Bindings go first so every id in a stored set resolves to a cell.
        for (id, cell) in &minted {
            self.graph.bind(id, cell).await?;
        }
        let ids: Vec<String> = minted.into_iter().map(|(id, _)| id).collect();
        let stored = self.graph.init_connections(producer, &ids).await?;
        if stored != ids {
            debug!(behaviour = producer, "Another worker explored first, adopting its connections");
        }
        Ok(stored)
    }

    /// Draw `k ∈ [0, max_signals]` fresh ids with a cell each.
    fn draw(&self, candidates: &[&str]) -> Vec<(String, String)> {
        if candidates.is_empty() {
            return Vec::new();
        }
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let k = rng.gen_range(0..=self.max_signals);
        (0..k)
            .filter_map(|_| candidates.choose(&mut *rng))
            .map(|cell| (ulid::Ulid::new().to_string(), cell.to_string()))
            .collect()
    }
}
