//! Activation: the gate between a queued payload and its cell.
//!
//! A payload activates once its arguments satisfy the destination cell's
//! declared inputs. Every cell currently receives its whole argument list
//! from one producer, so a payload either matches already or never will.
//! Merging partial arguments from several sources would hook in here.

use crate::cell::Cell;
use crate::error::EngineError;
use crate::network::Payload;

/// Pass the payload through unchanged if its arguments fit `cell`.
pub fn activate(cell: &dyn Cell, payload: Payload) -> Result<Payload, EngineError> {
    match cell.signature().check(&payload.args) {
        Ok(()) => Ok(payload),
        Err(reason) => Err(EngineError::NotActivated {
            cell: cell.name().to_string(),
            reason,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{FnCell, Signature, Value, ValueKind};
    use crate::network::Context;

    fn sum() -> FnCell {
        FnCell::new(
            "sum",
            Signature::new(vec![ValueKind::Int, ValueKind::Int], vec![ValueKind::Int]),
            |_, _| Ok(vec![Value::Int(0)]),
        )
    }

    fn payload(args: Vec<Value>) -> Payload {
        Payload::new(args, Context::new(), "b1", vec!["b0".into()])
    }

    #[test]
    fn matching_payloads_pass_unchanged() {
        let p = payload(vec![Value::Int(3), Value::Int(4)]);
        let ctx_id = p.context.id().to_string();
        let activated = activate(&sum(), p).unwrap();
        assert_eq!(activated.args, vec![Value::Int(3), Value::Int(4)]);
        assert_eq!(activated.destination, "b1");
        assert_eq!(activated.sources, vec!["b0"]);
        assert_eq!(activated.context.id(), ctx_id);
    }

    #[test]
    fn arity_mismatch_never_activates() {
        for args in [
            vec![],
            vec![Value::Int(1)],
            vec![Value::Int(1), Value::Int(2), Value::Int(3)],
        ] {
            let err = activate(&sum(), payload(args)).unwrap_err();
            assert!(matches!(err, EngineError::NotActivated { ref cell, .. } if cell == "sum"));
        }
    }

    #[test]
    fn kind_mismatch_never_activates() {
        let err = activate(&sum(), payload(vec![Value::Int(1), Value::from("2")])).unwrap_err();
        assert!(matches!(err, EngineError::NotActivated { .. }));
    }
}
