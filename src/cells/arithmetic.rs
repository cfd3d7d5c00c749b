//! Integer arithmetic and comparison cells.

use crate::cell::{Cell, FnCell, Signature, Value, ValueKind};
use crate::error::CellError;
use std::sync::Arc;

fn int_pair(cell: &str, args: &[Value]) -> Result<(i64, i64), CellError> {
    match args {
        [Value::Int(a), Value::Int(b)] => Ok((*a, *b)),
        _ => Err(CellError::domain(cell, "expected two integers")),
    }
}

fn binary(name: &'static str, output: ValueKind, op: fn(i64, i64) -> Result<Value, CellError>) -> Arc<dyn Cell> {
    let signature = Signature::new(vec![ValueKind::Int, ValueKind::Int], vec![output]);
    Arc::new(
        FnCell::new(name, signature, move |_, args| {
            let (a, b) = int_pair(name, &args)?;
            Ok(vec![op(a, b)?])
        })
        .with_metadata("category", "arithmetic"),
    )
}

fn overflow(cell: &str) -> CellError {
    CellError::domain(cell, "integer overflow")
}

pub fn sum() -> Arc<dyn Cell> {
    binary("sum", ValueKind::Int, |a, b| {
        a.checked_add(b).map(Value::Int).ok_or_else(|| overflow("sum"))
    })
}

pub fn subtract() -> Arc<dyn Cell> {
    binary("subtract", ValueKind::Int, |a, b| {
        a.checked_sub(b).map(Value::Int).ok_or_else(|| overflow("subtract"))
    })
}

pub fn multiply() -> Arc<dyn Cell> {
    binary("multiply", ValueKind::Int, |a, b| {
        a.checked_mul(b).map(Value::Int).ok_or_else(|| overflow("multiply"))
    })
}

/// Integer division. Fails on a zero divisor.
pub fn divide() -> Arc<dyn Cell> {
    let signature = Signature::new(vec![ValueKind::Int, ValueKind::Int], vec![ValueKind::Int]).fallible();
    Arc::new(
        FnCell::new("divide", signature, |_, args| {
            let (a, b) = int_pair("divide", &args)?;
            if b == 0 {
                return Err(CellError::domain("divide", "division by zero"));
            }
            a.checked_div(b)
                .map(|q| vec![Value::Int(q)])
                .ok_or_else(|| overflow("divide"))
        })
        .with_metadata("category", "arithmetic"),
    )
}

pub fn greater() -> Arc<dyn Cell> {
    binary("greater", ValueKind::Bool, |a, b| Ok(Value::Bool(a > b)))
}

pub fn equal() -> Arc<dyn Cell> {
    binary("equal", ValueKind::Bool, |a, b| Ok(Value::Bool(a == b)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Context;

    async fn call(cell: Arc<dyn Cell>, a: i64, b: i64) -> Result<Vec<Value>, CellError> {
        cell.call(&Context::new(), vec![Value::Int(a), Value::Int(b)]).await
    }

    #[tokio::test]
    async fn arithmetic() {
        assert_eq!(call(sum(), 3, 4).await.unwrap(), vec![Value::Int(7)]);
        assert_eq!(call(subtract(), 3, 4).await.unwrap(), vec![Value::Int(-1)]);
        assert_eq!(call(multiply(), 3, 4).await.unwrap(), vec![Value::Int(12)]);
        assert_eq!(call(divide(), 9, 2).await.unwrap(), vec![Value::Int(4)]);
    }

    #[tokio::test]
    async fn comparisons() {
        assert_eq!(call(greater(), 5, 4).await.unwrap(), vec![Value::Bool(true)]);
        assert_eq!(call(equal(), 5, 4).await.unwrap(), vec![Value::Bool(false)]);
    }

    #[tokio::test]
    async fn division_by_zero_is_a_domain_error() {
        let err = call(divide(), 1, 0).await.unwrap_err();
        assert_eq!(err.to_string(), "divide: division by zero");
        assert!(divide().signature().fallible);
    }

    #[tokio::test]
    async fn overflow_is_reported_not_wrapped() {
        assert!(matches!(
            call(sum(), i64::MAX, 1).await.unwrap_err(),
            CellError::Domain { .. }
        ));
    }
}
