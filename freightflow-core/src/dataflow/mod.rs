//! Minimal in-process dataflow engine.
//!
//! A [`Dataflow`] maps each output name to a function and its ordered input names.
//! The [`Driver`] builds a dependency graph of the nodes needed for a request,
//! sorts it topologically and runs each node once.

pub mod column;
pub mod driver;
pub mod graph;

pub use column::Column;
pub use driver::Driver;
pub use graph::{Dataflow, Node, NodeFn};
