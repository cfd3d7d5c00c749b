//! The message unit flowing through the graph.

use crate::cell::Value;
use crate::network::Context;
use serde::{Deserialize, Serialize};

/// Arguments addressed to one cell-instance.
///
/// Queued once, consumed by exactly one worker, then discarded.
#[derive(Debug, Serialize, Deserialize)]
pub struct Payload {
    pub args: Vec<Value>,
    pub context: Context,
    /// Destination cell-instance (behaviour) id.
    pub destination: String,
    /// Producing cell-instance ids. Only one is ever populated today.
    pub sources: Vec<String>,
}

impl Payload {
    /// Build a payload. Argument types are checked later, at activation.
    pub fn new(
        args: Vec<Value>,
        context: Context,
        destination: impl Into<String>,
        sources: Vec<String>,
    ) -> Self {
        Self {
            args,
            context,
            destination: destination.into(),
            sources,
        }
    }

    /// The producer this payload came from, if any.
    pub fn source(&self) -> Option<&str> {
        self.sources.first().map(String::as_str)
    }
}
