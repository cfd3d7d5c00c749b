//! Calculation: run an activated payload through its cell.

use crate::cell::Cell;
use crate::error::{CellError, EngineError};
use crate::network::Payload;

/// Invoke `cell` and wrap its outputs in a new payload.
///
/// Context, destination and sources carry over untouched; the forwarder
/// rewrites them per successor. A cell failure is returned as-is.
pub async fn calculate(cell: &dyn Cell, payload: Payload) -> Result<Payload, EngineError> {
    let Payload {
        args,
        context,
        destination,
        sources,
    } = payload;

    let outputs = cell.call(&context, args).await?;

    let expected = cell.signature().outputs.len();
    if outputs.len() != expected {
        return Err(CellError::ArityMismatch {
            cell: cell.name().to_string(),
            expected,
            actual: outputs.len(),
        }
        .into());
    }

    Ok(Payload::new(outputs, context, destination, sources))
}
