//! The Thunder flow execution engine.
//!
//! A stateful interpreter that advances a flow instance node-by-node through
//! a compiled graph, suspending for user input and resuming on the next
//! submission. Instances are serialized by a per-flow-id lock and swept
//! after an idle timeout.

mod engine;
mod inference;
mod instance;

pub use engine::{EngineError, FlowEngine, FlowResult, NextNode};
pub use inference::infer_registration_flow;
pub use instance::{spawn_sweeper, FlowInstance, InstanceStore};
