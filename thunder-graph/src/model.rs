use std::collections::HashMap;

use thunder_core::flow::{ExecutorRef, InputDescriptor, NodeType};

/// One client-selectable action of a compiled PROMPT node.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledAction {
    pub action_ref: String,
    pub next_node: String,
    pub inputs: Vec<InputDescriptor>,
}

/// A node of the executable graph.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledNode {
    pub id: String,
    pub kind: NodeType,
    pub executor: Option<ExecutorRef>,
    pub on_success: Option<String>,
    pub on_failure: Option<String>,
    pub on_incomplete: Option<String>,
    /// Actions of a PROMPT node, in definition order.
    pub actions: Vec<CompiledAction>,
    /// Union of the node's declared inputs, deduplicated by identifier.
    pub required_inputs: Vec<InputDescriptor>,
    pub properties: HashMap<String, String>,
    pub meta: Option<serde_json::Value>,
}

impl CompiledNode {
    pub fn action(&self, action_ref: &str) -> Option<&CompiledAction> {
        self.actions.iter().find(|a| a.action_ref == action_ref)
    }
}

/// Compiled form of a flow definition: an executable DAG addressed by node
/// id.
#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    pub flow_id: String,
    pub version: u32,
    pub start_node_id: String,
    pub nodes: HashMap<String, CompiledNode>,
}

impl Graph {
    pub fn node(&self, id: &str) -> Option<&CompiledNode> {
        self.nodes.get(id)
    }
}
