//! The built-in cell library.

pub mod arithmetic;
pub mod output;
pub mod text;

pub use output::OutputCell;
pub use text::{InputCell, SplitFeatures};

use crate::cell::Registry;
use crate::engine::Wiring;
use crate::error::ConfigError;
use std::sync::Arc;

/// Registry with the entry, feature, arithmetic and output cells.
pub fn standard_registry(wiring: &Wiring) -> Result<Registry, ConfigError> {
    let mut registry = Registry::new();
    registry.register(Arc::new(InputCell::new(wiring.graph.clone())))?;
    registry.register(Arc::new(SplitFeatures::new(
        wiring.graph.clone(),
        wiring.config.separator.clone(),
    )))?;
    for cell in [
        arithmetic::sum(),
        arithmetic::subtract(),
        arithmetic::multiply(),
        arithmetic::divide(),
        arithmetic::greater(),
        arithmetic::equal(),
    ] {
        registry.register(cell)?;
    }
    registry.register(Arc::new(OutputCell::new(wiring)))?;
    Ok(registry)
}
