//! Shared types used across the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the entry cell every submission is addressed to.
pub const INPUT_CELL: &str = "input";

/// Name of the terminal cell that compares results to expectations.
pub const OUTPUT_CELL: &str = "output";

// ---------------------------------------------------------------------------
// Submissions
// ---------------------------------------------------------------------------

/// One unit of client input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub input: String,

    /// Address the submission straight to the output cell.
    #[serde(default)]
    pub echo: bool,

    #[serde(alias = "sessionID")]
    pub session_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expectation: Option<String>,
}

impl Submission {
    pub fn new(input: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            echo: false,
            session_id: session_id.into(),
            expectation: None,
        }
    }

    pub fn expecting(mut self, expectation: impl Into<String>) -> Self {
        self.expectation = Some(expectation.into());
        self
    }

    pub fn echoed(mut self) -> Self {
        self.echo = true;
        self
    }
}

// ---------------------------------------------------------------------------
// Event lifecycle
// ---------------------------------------------------------------------------

/// Stages one queued payload moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStage {
    Queued,
    Activating,
    Calculating,
    Forwarding,
    Tracked,
}

impl fmt::Display for EventStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Activating => write!(f, "activating"),
            Self::Calculating => write!(f, "calculating"),
            Self::Forwarding => write!(f, "forwarding"),
            Self::Tracked => write!(f, "tracked"),
        }
    }
}

/// How a processed payload left the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Successors were enqueued (zero means a dead end).
    Forwarded { successors: usize },
    /// A terminal cell consumed the payload.
    Terminated,
}

/// Notifications broadcast to engine observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A submission was turned into its first payload.
    Accepted { session_id: String, tree_id: String },
    /// The output cell delivered a result to the caller.
    Emitted {
        session_id: String,
        tree_id: String,
        output: String,
    },
    /// A result missed its expectation and the tree was re-entered.
    ExpectationNotMet { tree_id: String, attempt: i64 },
    /// The tree missed its expectation more often than allowed.
    RetraversalBudgetExhausted { tree_id: String, attempts: i64 },
    /// A producer forwarded to no successors.
    DeadEnd { behaviour_id: String },
    /// An event failed and was discarded.
    Dropped {
        behaviour_id: String,
        cell: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submissions_accept_the_wire_field_names() {
        let sub: Submission =
            serde_json::from_str(r#"{"input":"3 4","sessionID":"s1","expectation":"7"}"#).unwrap();
        assert_eq!(sub, Submission::new("3 4", "s1").expecting("7"));
        assert!(!sub.echo);
    }

    #[test]
    fn events_serialize_with_a_tag() {
        let json = serde_json::to_string(&EngineEvent::DeadEnd {
            behaviour_id: "b".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"dead_end","behaviour_id":"b"}"#);
    }
}
