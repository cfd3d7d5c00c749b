//! Worker loops for the input and event pools.
//!
//! Each loop blocks on its queue until the shared cancellation token fires.
//! An event that fails is logged and dropped; the worker keeps going.

use crate::engine::Engine;
use crate::error::{CellError, EngineError};
use crate::network::Payload;
use crate::types::{EngineEvent, EventOutcome, Submission};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub(crate) async fn run_input_worker(engine: Engine, id: usize, cancel: CancellationToken) {
    info!(worker = id, "Input worker started");

    loop {
        let submission: Submission = match engine.input_queue().pop(&cancel).await {
            Ok(Some(s)) => s,
            Ok(None) => break,
            Err(e) => {
                error!(worker = id, "Failed to dequeue submission: {e}");
                pause(&engine, &cancel).await;
                continue;
            }
        };

        let session = submission.session_id.clone();
        match engine.accept(submission).await {
            Ok(tree) => debug!(worker = id, session = %session, tree = %tree, "Tree started"),
            Err(e) => error!(worker = id, session = %session, "Failed to accept submission: {e}"),
        }
    }

    info!(worker = id, "Input worker stopped");
}

pub(crate) async fn run_event_worker(engine: Engine, id: usize, cancel: CancellationToken) {
    info!(worker = id, "Event worker started");

    loop {
        let payload: Payload = match engine.event_queue().pop(&cancel).await {
            Ok(Some(p)) => p,
            Ok(None) => break,
            Err(e) => {
                error!(worker = id, "Failed to dequeue event: {e}");
                pause(&engine, &cancel).await;
                continue;
            }
        };

        handle_event(&engine, id, payload).await;
    }

    info!(worker = id, "Event worker stopped");
}

/// Process one payload and turn its result into logs and engine events.
async fn handle_event(engine: &Engine, worker: usize, payload: Payload) {
    let behaviour = payload.destination.clone();
    let cell = payload.context.clg_name().unwrap_or("?").to_string();

    match engine.process(payload).await {
        Ok(EventOutcome::Forwarded { successors }) => {
            debug!(worker, behaviour = %behaviour, cell = %cell, successors, "Event forwarded");
        }
        Ok(EventOutcome::Terminated) => {
            debug!(worker, behaviour = %behaviour, cell = %cell, "Event terminated");
        }
        Err(EngineError::Cell(CellError::ExpectationNotMet { tree_id, attempt })) => {
            debug!(worker, tree = %tree_id, attempt, "Expectation not met, retraversing");
            engine.publish(EngineEvent::ExpectationNotMet { tree_id, attempt });
        }
        Err(EngineError::Cell(CellError::RetraversalBudgetExhausted { tree_id, attempts })) => {
            warn!(worker, tree = %tree_id, attempts, "Retraversal budget exhausted");
            engine.publish(EngineEvent::RetraversalBudgetExhausted { tree_id, attempts });
        }
        Err(e) => {
            warn!(worker, behaviour = %behaviour, cell = %cell, "Event dropped: {e}");
            engine.publish(EngineEvent::Dropped {
                behaviour_id: behaviour,
                cell,
                reason: e.to_string(),
            });
        }
    }
}

/// Back off after a failed dequeue so a broken store doesn't spin.
async fn pause(engine: &Engine, cancel: &CancellationToken) {
    let delay = Duration::from_millis(engine.config().poll_interval_ms);
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(delay) => {}
    }
}
