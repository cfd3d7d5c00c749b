//! Text-facing cells: the graph entry and feature extraction.

use crate::cell::{Cell, Signature, Value, ValueKind};
use crate::error::{CellError, StoreError};
use crate::graph::{keys, Graph};
use crate::network::Context;
use crate::types::INPUT_CELL;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Entry cell for every non-echo submission.
///
/// Makes sure the text has an information record, then passes it through.
pub struct InputCell {
    graph: Graph,
    signature: Signature,
}

impl InputCell {
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            signature: Signature::new(vec![ValueKind::Text], vec![ValueKind::Text]),
        }
    }
}

#[async_trait]
impl Cell for InputCell {
    fn name(&self) -> &str {
        INPUT_CELL
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn entry(&self) -> bool {
        true
    }

    async fn call(&self, _ctx: &Context, args: Vec<Value>) -> Result<Vec<Value>, CellError> {
        let text = args
            .first()
            .and_then(Value::as_text)
            .ok_or_else(|| CellError::domain(INPUT_CELL, "expected text"))?;
        self.graph.information_id_for(text).await?;
        Ok(args)
    }
}

/// Splits `"<a><sep><b>"` into two integers.
///
/// The separator is read from the store on every call so it can be changed
/// while the engine runs.
pub struct SplitFeatures {
    graph: Graph,
    default_separator: String,
    signature: Signature,
}

impl SplitFeatures {
    pub const NAME: &'static str = "split-features";

    pub fn new(graph: Graph, default_separator: impl Into<String>) -> Self {
        Self {
            graph,
            default_separator: default_separator.into(),
            signature: Signature::new(vec![ValueKind::Text], vec![ValueKind::Int, ValueKind::Int])
                .fallible(),
        }
    }

    async fn separator(&self) -> Result<String, StoreError> {
        match self.graph.store().get(keys::SEPARATOR).await {
            Ok(sep) if !sep.is_empty() => Ok(sep),
            Ok(_) => Ok(self.default_separator.clone()),
            Err(e) if e.is_not_found() => Ok(self.default_separator.clone()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Cell for SplitFeatures {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn metadata(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("separator".to_string(), self.default_separator.clone())])
    }

    async fn call(&self, _ctx: &Context, args: Vec<Value>) -> Result<Vec<Value>, CellError> {
        let text = args
            .first()
            .and_then(Value::as_text)
            .ok_or_else(|| CellError::domain(Self::NAME, "expected text"))?;
        let separator = self.separator().await?;

        let parts: Vec<&str> = text
            .split(separator.as_str())
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        let [a, b] = parts.as_slice() else {
            return Err(CellError::domain(
                Self::NAME,
                format!("expected two features separated by {separator:?}, got {}", parts.len()),
            ));
        };

        let parse = |s: &str| {
            s.parse::<i64>()
                .map(Value::Int)
                .map_err(|e| CellError::domain(Self::NAME, format!("'{s}' is not an integer: {e}")))
        };
        Ok(vec![parse(*a)?, parse(*b)?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStore;
    use std::sync::Arc;

    fn graph() -> Graph {
        Graph::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn input_records_the_information() {
        let g = graph();
        let out = InputCell::new(g.clone())
            .call(&Context::new(), vec![Value::from("3 4")])
            .await
            .unwrap();
        assert_eq!(out, vec![Value::from("3 4")]);

        let id = g.information_id_for("3 4").await.unwrap();
        assert_eq!(g.information(&id).await.unwrap(), "3 4");
    }

    #[tokio::test]
    async fn split_uses_the_configured_separator() {
        let cell = SplitFeatures::new(graph(), " ");
        let out = cell.call(&Context::new(), vec![Value::from("3 4")]).await.unwrap();
        assert_eq!(out, vec![Value::Int(3), Value::Int(4)]);
    }

    #[tokio::test]
    async fn stored_separator_wins() {
        let g = graph();
        g.store().set(keys::SEPARATOR, ",").await.unwrap();
        let cell = SplitFeatures::new(g, " ");
        let out = cell.call(&Context::new(), vec![Value::from("10, -2")]).await.unwrap();
        assert_eq!(out, vec![Value::Int(10), Value::Int(-2)]);
    }

    #[tokio::test]
    async fn split_rejects_bad_features() {
        let cell = SplitFeatures::new(graph(), " ");
        for input in ["3", "3 4 5", "three 4"] {
            let err = cell.call(&Context::new(), vec![Value::from(input)]).await.unwrap_err();
            assert!(matches!(err, CellError::Domain { .. }), "{input}");
        }
    }
}
