//! Context and payload: what travels between cells.

pub mod context;
pub mod payload;

pub use context::Context;
pub use payload::Payload;
