//! Name → cell lookup, built once at startup and shared read-only.

use crate::cell::{Cell, Value};
use crate::error::ConfigError;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The set of cells an engine can dispatch to.
#[derive(Default, Clone)]
pub struct Registry {
    cells: BTreeMap<String, Arc<dyn Cell>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cell. Names must be unique.
    pub fn register(&mut self, cell: Arc<dyn Cell>) -> Result<(), ConfigError> {
        let name = cell.name().to_string();
        if self.cells.contains_key(&name) {
            return Err(ConfigError::Invalid(format!("cell '{name}' registered twice")));
        }
        self.cells.insert(name, cell);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Cell>> {
        self.cells.get(name).cloned()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    /// Registered cells in name order.
    pub fn cells(&self) -> impl Iterator<Item = &Arc<dyn Cell>> {
        self.cells.values()
    }

    /// Non-entry cells that would activate on `args`, in sorted order.
    pub fn candidates(&self, args: &[Value]) -> Vec<&str> {
        self.cells
            .values()
            .filter(|c| !c.entry() && c.signature().accepts(args))
            .map(|c| c.name())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{FnCell, Signature, ValueKind};

    fn cell(name: &str, inputs: Vec<ValueKind>) -> Arc<dyn Cell> {
        Arc::new(FnCell::new(name, Signature::new(inputs, vec![]), |_, _| Ok(vec![])))
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = Registry::new();
        registry.register(cell("sum", vec![])).unwrap();
        assert!(registry.register(cell("sum", vec![])).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn candidates_filter_by_signature() {
        let mut registry = Registry::new();
        registry.register(cell("sum", vec![ValueKind::Int, ValueKind::Int])).unwrap();
        registry.register(cell("output", vec![ValueKind::Any])).unwrap();
        registry.register(cell("split", vec![ValueKind::Text])).unwrap();

        assert_eq!(registry.candidates(&[Value::Int(1), Value::Int(2)]), vec!["sum"]);
        assert_eq!(registry.candidates(&[Value::from("3 4")]), vec!["output", "split"]);
        assert!(registry.candidates(&[]).is_empty());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn listing_is_sorted_by_name() {
        let mut registry = Registry::new();
        for name in ["sum", "output", "input"] {
            registry.register(cell(name, vec![])).unwrap();
        }
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["input", "output", "sum"]);
        let listed: Vec<&str> = registry.cells().map(|c| c.name()).collect();
        assert_eq!(listed, vec!["input", "output", "sum"]);
    }
}
