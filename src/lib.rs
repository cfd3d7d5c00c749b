//! Cellgraph: a self-wiring computation graph.
//!
//! Submissions enter through the input cell and flow through cell-instances
//! ("behaviours") chosen by the forwarder. The first time a behaviour
//! forwards, its successors are drawn at random and persisted; every later
//! run replays them. A terminal output cell compares the result to an
//! optional expectation and re-enters the tree when it misses.

pub mod cell;
pub mod cells;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod network;
pub mod state;
pub mod types;

pub use engine::{Engine, EngineBuilder, EngineHandle};
