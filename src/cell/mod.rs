//! Cells: named compute units with a declared signature.
//!
//! Every cell, whatever its parameter types, is invoked through the same
//! `(Context, Vec<Value>) -> Vec<Value>` shape. Type information lives in the
//! `Signature`, checked once at activation, so the engine's hot path never
//! inspects types at call time.

pub mod registry;
pub mod value;

pub use registry::Registry;
pub use value::{Value, ValueKind};

use crate::error::CellError;
use crate::network::Context;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;

/// Declared parameter and result shape of a cell (the context is implicit).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub inputs: Vec<ValueKind>,
    pub outputs: Vec<ValueKind>,
    /// Whether the cell can fail with a domain error.
    pub fallible: bool,
}

impl Signature {
    pub fn new(inputs: Vec<ValueKind>, outputs: Vec<ValueKind>) -> Self {
        Self {
            inputs,
            outputs,
            fallible: false,
        }
    }

    pub fn fallible(mut self) -> Self {
        self.fallible = true;
        self
    }

    /// Check that `args` match the declared inputs in count and kind.
    pub fn check(&self, args: &[Value]) -> Result<(), String> {
        if args.len() != self.inputs.len() {
            return Err(format!(
                "expected {} arguments, got {}",
                self.inputs.len(),
                args.len()
            ));
        }
        for (i, (kind, arg)) in self.inputs.iter().zip(args).enumerate() {
            if !kind.admits(arg) {
                return Err(format!("argument {i} should be {kind}, got {}", arg.kind()));
            }
        }
        Ok(())
    }

    pub fn accepts(&self, args: &[Value]) -> bool {
        self.check(args).is_ok()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |kinds: &[ValueKind]| {
            kinds
                .iter()
                .map(ValueKind::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(f, "(context, {}) -> ({}", join(&self.inputs), join(&self.outputs))?;
        if self.fallible {
            if self.outputs.is_empty() {
                write!(f, "error")?;
            } else {
                write!(f, ", error")?;
            }
        }
        write!(f, ")")
    }
}

/// A registered compute unit.
#[async_trait]
pub trait Cell: Send + Sync {
    /// Registry name, also stored as the context's `clg_name`.
    fn name(&self) -> &str;

    fn signature(&self) -> &Signature;

    /// Free-form descriptive metadata.
    fn metadata(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Terminal cells end a branch; nothing is forwarded after them.
    fn terminal(&self) -> bool {
        false
    }

    /// Entry cells only receive fresh submissions and are never explored into.
    fn entry(&self) -> bool {
        false
    }

    /// Compute outputs from the arguments.
    async fn call(&self, ctx: &Context, args: Vec<Value>) -> Result<Vec<Value>, CellError>;
}

type CellFn = dyn Fn(&Context, Vec<Value>) -> Result<Vec<Value>, CellError> + Send + Sync;

/// Adapts a plain closure into a `Cell`.
pub struct FnCell {
    name: String,
    signature: Signature,
    metadata: BTreeMap<String, String>,
    f: Box<CellFn>,
}

impl FnCell {
    pub fn new<F>(name: impl Into<String>, signature: Signature, f: F) -> Self
    where
        F: Fn(&Context, Vec<Value>) -> Result<Vec<Value>, CellError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            signature,
            metadata: BTreeMap::new(),
            f: Box::new(f),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
impl Cell for FnCell {
    fn name(&self) -> &str {
        &self.name
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn metadata(&self) -> BTreeMap<String, String> {
        self.metadata.clone()
    }

    async fn call(&self, ctx: &Context, args: Vec<Value>) -> Result<Vec<Value>, CellError> {
        (self.f)(ctx, args)
    }
}
