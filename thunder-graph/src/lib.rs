//! Executable graph model, compiler, and compiled-graph cache.
//!
//! A [`FlowDefinition`](thunder_core::FlowDefinition) is compiled once into a
//! [`Graph`] of [`CompiledNode`]s; the engine only ever walks compiled
//! graphs. Compilation is pure and deterministic, and compiled graphs are
//! cached per `(flow_id, version)`.

mod cache;
mod compile;
mod model;

pub use cache::GraphCache;
pub use compile::{compile, CompileError, ExecutorLookup};
pub use model::{CompiledAction, CompiledNode, Graph};
