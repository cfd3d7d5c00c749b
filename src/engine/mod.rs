//! The execution engine.
//!
//! Two worker pools share one store:
//!
//! - the **input pool** turns submissions into the first payload of a tree
//!   and enqueues it;
//! - the **event pool** drains payloads through
//!   Activate → Calculate → Forward → Track, enqueuing 0..N successors.
//!
//! The durable queues are the only coordination between workers. A failure
//! in one event is logged and the worker moves on to its next dequeue.

pub mod activator;
pub mod calculator;
pub mod forwarder;
pub mod queue;
pub mod tracker;
mod worker;

pub use forwarder::Forwarder;
pub use queue::Queue;
pub use tracker::Tracker;

use crate::cell::{Registry, Value};
use crate::config::EngineConfig;
use crate::error::{ConfigError, EngineError, StoreError};
use crate::graph::{keys, Graph};
use crate::network::{Context, Payload};
use crate::state::{RetryPolicy, RetryStore, Store};
use crate::types::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Engine internals a cell may need: the graph, the event queue and the
/// event bus. Handed to the registry factory at build time.
#[derive(Clone)]
pub struct Wiring {
    pub config: EngineConfig,
    pub graph: Graph,
    pub events_queue: Queue,
    pub events: broadcast::Sender<EngineEvent>,
}

type RegistryFactory = Box<dyn FnOnce(&Wiring) -> Result<Registry, ConfigError> + Send>;

/// Assembles an `Engine`, failing fast on missing collaborators.
pub struct EngineBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn Store>>,
    registry: Option<RegistryFactory>,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Supply the cells. The factory runs once, inside `build`.
    pub fn cells<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(&Wiring) -> Result<Registry, ConfigError> + Send + 'static,
    {
        self.registry = Some(Box::new(factory));
        self
    }

    /// Supply a prebuilt registry for cells that need no engine wiring.
    pub fn registry(self, registry: Registry) -> Self {
        self.cells(move |_| Ok(registry))
    }

    pub fn build(self) -> Result<Engine, ConfigError> {
        self.config.validate()?;
        let raw_store = self.store.ok_or(ConfigError::MissingCollaborator("store"))?;
        let factory = self.registry.ok_or(ConfigError::MissingCollaborator("cell registry"))?;

        let store: Arc<dyn Store> =
            Arc::new(RetryStore::new(raw_store, RetryPolicy::from_config(&self.config)));
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        let graph = Graph::new(store.clone());
        let input_queue = Queue::new(store.clone(), keys::INPUT_QUEUE, poll);
        let event_queue = Queue::new(store.clone(), keys::EVENT_QUEUE, poll);
        let (events, _) = broadcast::channel(self.config.event_capacity);

        let wiring = Wiring {
            config: self.config.clone(),
            graph: graph.clone(),
            events_queue: event_queue.clone(),
            events: events.clone(),
        };
        let registry = Arc::new(factory(&wiring)?);
        if registry.get(INPUT_CELL).is_none() {
            return Err(ConfigError::MissingCollaborator("input cell"));
        }
        if registry.get(OUTPUT_CELL).is_none() {
            return Err(ConfigError::MissingCollaborator("output cell"));
        }

        let forwarder = Forwarder::new(
            graph.clone(),
            registry.clone(),
            event_queue.clone(),
            self.config.max_signals,
            self.config.rng_seed,
        );
        let tracker = Tracker::new(store.clone());

        info!(
            cells = %registry.names().collect::<Vec<_>>().join(", "),
            event_workers = self.config.event_workers,
            max_signals = self.config.max_signals,
            "Engine built"
        );

        Ok(Engine {
            shared: Arc::new(Shared {
                config: self.config,
                store,
                graph,
                registry,
                forwarder,
                tracker,
                input_queue,
                event_queue,
                events,
            }),
        })
    }
}

struct Shared {
    config: EngineConfig,
    store: Arc<dyn Store>,
    graph: Graph,
    registry: Arc<Registry>,
    forwarder: Forwarder,
    tracker: Tracker,
    input_queue: Queue,
    event_queue: Queue,
    events: broadcast::Sender<EngineEvent>,
}

/// Handle to a built engine. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder {
            config: EngineConfig::default(),
            store: None,
            registry: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// The retrying store every component goes through.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.shared.store
    }

    pub fn graph(&self) -> &Graph {
        &self.shared.graph
    }

    pub fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    pub fn input_queue(&self) -> &Queue {
        &self.shared.input_queue
    }

    pub fn event_queue(&self) -> &Queue {
        &self.shared.event_queue
    }

    /// Receive every event broadcast from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.shared.events.subscribe()
    }

    /// Stream of results emitted for one session.
    pub fn outputs(&self, session_id: impl Into<String>) -> SessionOutputs {
        SessionOutputs {
            session_id: session_id.into(),
            events: self.subscribe(),
        }
    }

    pub(crate) fn publish(&self, event: EngineEvent) {
        // No subscribers is fine.
        let _ = self.shared.events.send(event);
    }

    /// Append a submission to the durable input queue.
    pub async fn submit(&self, submission: &Submission) -> Result<(), StoreError> {
        self.shared.input_queue.push(submission).await
    }

    /// Spawn both worker pools.
    pub fn start(&self) -> EngineHandle {
        let cancel = CancellationToken::new();
        let mut workers = Vec::new();

        for id in 0..self.shared.config.input_workers {
            workers.push(tokio::spawn(worker::run_input_worker(
                self.clone(),
                id,
                cancel.clone(),
            )));
        }
        for id in 0..self.shared.config.event_workers {
            workers.push(tokio::spawn(worker::run_event_worker(
                self.clone(),
                id,
                cancel.clone(),
            )));
        }

        info!(workers = workers.len(), "Engine started");
        EngineHandle { cancel, workers }
    }

    /// Turn a submission into the first payload of a new tree.
    ///
    /// Returns the new tree id.
    pub async fn accept(&self, submission: Submission) -> Result<String, EngineError> {
        let graph = &self.shared.graph;
        let tree_id = ulid::Ulid::new().to_string();
        let entry_cell = if submission.echo { OUTPUT_CELL } else { INPUT_CELL };

        let information_id = graph.information_id_for(&submission.input).await?;
        let first = graph.entry_behaviour(&information_id, entry_cell).await?;
        graph.anchor_tree(&tree_id, &first).await?;

        let mut context = Context::new();
        context.set_behaviour_id(first.as_str());
        context.set_clg_name(entry_cell);
        context.set_tree_id(tree_id.as_str());
        context.set_session_id(submission.session_id.as_str());
        context.set_information_id(information_id);
        context.set_expectation(submission.expectation);

        let payload = Payload::new(vec![Value::Text(submission.input)], context, first.as_str(), vec![]);
        self.shared.event_queue.push(&payload).await?;

        debug!(tree = %tree_id, behaviour = %first, cell = entry_cell, "Submission accepted");
        self.publish(EngineEvent::Accepted {
            session_id: submission.session_id,
            tree_id: tree_id.clone(),
        });
        Ok(tree_id)
    }

    /// Run one payload through Activate → Calculate → Forward → Track.
    pub async fn process(&self, payload: Payload) -> Result<EventOutcome, EngineError> {
        let behaviour = payload.destination.clone();
        let clg = payload
            .context
            .clg_name()
            .ok_or(EngineError::MissingContext("cell name"))?
            .to_string();
        let cell = self
            .shared
            .registry
            .get(&clg)
            .ok_or_else(|| EngineError::UnknownCell(clg.clone()))?;

        debug!(behaviour = %behaviour, cell = %clg, "Event {}", EventStage::Activating);
        let payload = activator::activate(cell.as_ref(), payload)?;

        debug!(behaviour = %behaviour, cell = %clg, "Event {}", EventStage::Calculating);
        let result = calculator::calculate(cell.as_ref(), payload).await?;

        let outcome = if cell.terminal() {
            EventOutcome::Terminated
        } else {
            debug!(behaviour = %behaviour, cell = %clg, "Event {}", EventStage::Forwarding);
            let successors = self.shared.forwarder.forward(cell.as_ref(), &result).await?;
            if successors == 0 {
                self.publish(EngineEvent::DeadEnd {
                    behaviour_id: behaviour.clone(),
                });
            }
            EventOutcome::Forwarded { successors }
        };

        if let Err(e) = self.shared.tracker.track(&result).await {
            warn!(behaviour = %behaviour, "Failed to track exercised edge: {e}");
        }
        debug!(behaviour = %behaviour, cell = %clg, "Event {}", EventStage::Tracked);

        Ok(outcome)
    }
}

/// Running worker pools.
pub struct EngineHandle {
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    /// The shared stop signal.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop dequeuing and wait for in-flight events to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!("Worker join error: {e}");
            }
        }
        info!("Engine stopped");
    }
}

/// Results emitted for a single session.
pub struct SessionOutputs {
    session_id: String,
    events: broadcast::Receiver<EngineEvent>,
}

impl SessionOutputs {
    /// Next output for the session, or `None` once the engine is gone.
    pub async fn next(&mut self) -> Option<String> {
        loop {
            match self.events.recv().await {
                Ok(EngineEvent::Emitted {
                    session_id, output, ..
                }) if session_id == self.session_id => return Some(output),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(session = %self.session_id, skipped, "Output stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells;
    use crate::error::CellError;
    use crate::state::MemoryStore;

    fn engine(config: EngineConfig) -> Engine {
        Engine::builder()
            .config(config)
            .store(Arc::new(MemoryStore::new()))
            .cells(cells::standard_registry)
            .build()
            .unwrap()
    }

    #[test]
    fn missing_store_fails_fast() {
        let err = Engine::builder()
            .cells(cells::standard_registry)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::MissingCollaborator("store")));
    }

    #[test]
    fn missing_cells_fail_fast() {
        let err = Engine::builder()
            .store(Arc::new(MemoryStore::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::MissingCollaborator("cell registry")));

        let err = Engine::builder()
            .store(Arc::new(MemoryStore::new()))
            .registry(Registry::new())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::MissingCollaborator("input cell")));
    }

    #[tokio::test]
    async fn accept_enqueues_the_entry_payload() {
        let engine = engine(EngineConfig::default());
        let tree = engine
            .accept(Submission::new("3 4", "s1").expecting("7"))
            .await
            .unwrap();

        let payload: Payload = engine.event_queue().try_pop().await.unwrap().unwrap();
        assert_eq!(payload.args, vec![Value::from("3 4")]);
        assert_eq!(payload.context.clg_name(), Some(INPUT_CELL));
        assert_eq!(payload.context.tree_id(), Some(tree.as_str()));
        assert_eq!(payload.context.session_id(), Some("s1"));
        assert_eq!(payload.context.expectation(), Some("7"));
        assert_eq!(engine.graph().first_behaviour(&tree).await.unwrap(), payload.destination);
    }

    #[tokio::test]
    async fn echo_bypasses_the_input_cell() {
        let engine = engine(EngineConfig::default());
        engine.accept(Submission::new("hi", "s1").echoed()).await.unwrap();
        let payload: Payload = engine.event_queue().try_pop().await.unwrap().unwrap();
        assert_eq!(payload.context.clg_name(), Some(OUTPUT_CELL));

        let mut outputs = engine.outputs("s1");
        assert_eq!(engine.process(payload).await.unwrap(), EventOutcome::Terminated);
        assert_eq!(outputs.next().await.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn unknown_cells_are_reported() {
        let engine = engine(EngineConfig::default());
        let mut ctx = Context::new();
        ctx.set_clg_name("teleport");
        let err = engine
            .process(Payload::new(vec![], ctx, "b", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownCell(ref name) if name == "teleport"));
    }

    #[tokio::test]
    async fn cell_failures_surface_per_event() {
        let engine = engine(EngineConfig::default());
        let mut ctx = Context::new();
        ctx.set_clg_name("divide");
        ctx.set_behaviour_id("b");
        let err = engine
            .process(Payload::new(vec![Value::Int(1), Value::Int(0)], ctx, "b", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Cell(CellError::Domain { .. })));
        assert_eq!(engine.event_queue().len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn forwarding_from_a_learned_dead_end_publishes_it() {
        let engine = engine(EngineConfig::default());
        engine.graph().init_connections("b", &[]).await.unwrap();
        let mut events = engine.subscribe();

        let mut ctx = Context::new();
        ctx.set_clg_name("sum");
        ctx.set_behaviour_id("b");
        let outcome = engine
            .process(Payload::new(vec![Value::Int(1), Value::Int(2)], ctx, "b", vec![]))
            .await
            .unwrap();

        assert_eq!(outcome, EventOutcome::Forwarded { successors: 0 });
        assert_eq!(
            events.recv().await.unwrap(),
            EngineEvent::DeadEnd {
                behaviour_id: "b".into()
            }
        );
    }
}
