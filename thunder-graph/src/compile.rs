use std::collections::{HashMap, HashSet};

use thunder_core::flow::{FlowDefinition, NodeDefinition, NodeType};
use tracing::warn;

use crate::model::{CompiledAction, CompiledNode, Graph};

/// Resolves executor names during compilation.
///
/// Implemented by the executor registry; the compiler only needs existence
/// checks.
pub trait ExecutorLookup {
    fn has_executor(&self, name: &str) -> bool;
}

impl ExecutorLookup for HashSet<String> {
    fn has_executor(&self, name: &str) -> bool {
        self.contains(name)
    }
}

/// A definition rejected by the compiler, carrying a precise first error.
#[derive(Debug, PartialEq, Eq)]
pub enum CompileError {
    MissingStartNode,
    MultipleStartNodes,
    MissingEndNode,
    DuplicateNodeId(String),
    UnknownTransitionTarget { node: String, target: String },
    MissingExecutor(String),
    UnknownExecutor { node: String, executor: String },
    DuplicateInputRef { node: String, input: String },
    NoOutgoingTransition(String),
    CycleWithoutPrompt(String),
    NoPathToEnd,
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::MissingStartNode => write!(f, "Flow has no START node"),
            CompileError::MultipleStartNodes => write!(f, "Flow has more than one START node"),
            CompileError::MissingEndNode => write!(f, "Flow has no END node"),
            CompileError::DuplicateNodeId(id) => write!(f, "Duplicate node id '{id}'"),
            CompileError::UnknownTransitionTarget { node, target } => {
                write!(f, "Node '{node}' transitions to unknown node '{target}'")
            }
            CompileError::MissingExecutor(node) => {
                write!(f, "Task node '{node}' names no executor")
            }
            CompileError::UnknownExecutor { node, executor } => {
                write!(f, "Node '{node}' references unknown executor '{executor}'")
            }
            CompileError::DuplicateInputRef { node, input } => {
                write!(f, "Node '{node}' declares duplicate input '{input}'")
            }
            CompileError::NoOutgoingTransition(node) => {
                write!(f, "Node '{node}' has no outgoing transition")
            }
            CompileError::CycleWithoutPrompt(node) => {
                write!(f, "Cycle through node '{node}' is not broken by a prompt")
            }
            CompileError::NoPathToEnd => {
                write!(f, "No END node is reachable from START")
            }
        }
    }
}

impl std::error::Error for CompileError {}

/// Compile a flow definition into an executable [`Graph`].
///
/// Pure and deterministic: the same definition always yields the same graph
/// or the same first error. Partial graphs are never produced.
pub fn compile(
    definition: &FlowDefinition,
    executors: &dyn ExecutorLookup,
) -> Result<Graph, CompileError> {
    let mut seen_ids = HashSet::new();
    for node in &definition.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            return Err(CompileError::DuplicateNodeId(node.id.clone()));
        }
    }

    let start_ids: Vec<&str> = definition
        .nodes
        .iter()
        .filter(|n| n.node_type == NodeType::Start)
        .map(|n| n.id.as_str())
        .collect();
    let start_node_id = match start_ids.as_slice() {
        [] => return Err(CompileError::MissingStartNode),
        [only] => only.to_string(),
        _ => return Err(CompileError::MultipleStartNodes),
    };

    if !definition.nodes.iter().any(|n| n.node_type == NodeType::End) {
        return Err(CompileError::MissingEndNode);
    }

    for node in &definition.nodes {
        validate_node(node, definition, executors)?;
    }

    detect_unprompted_cycles(definition)?;
    check_reachability(definition, &start_node_id)?;

    let nodes = definition
        .nodes
        .iter()
        .map(|node| (node.id.clone(), compile_node(node)))
        .collect();

    Ok(Graph {
        flow_id: definition.id.clone(),
        version: definition.active_version,
        start_node_id,
        nodes,
    })
}

fn validate_node(
    node: &NodeDefinition,
    definition: &FlowDefinition,
    executors: &dyn ExecutorLookup,
) -> Result<(), CompileError> {
    let targets = node
        .on_success
        .iter()
        .chain(node.on_failure.iter())
        .chain(node.on_incomplete.iter())
        .chain(node.prompts.iter().map(|p| &p.action.next_node));
    for target in targets {
        if definition.node(target).is_none() {
            return Err(CompileError::UnknownTransitionTarget {
                node: node.id.clone(),
                target: target.clone(),
            });
        }
    }

    if node.node_type == NodeType::TaskExecution {
        let executor = node
            .executor
            .as_ref()
            .ok_or_else(|| CompileError::MissingExecutor(node.id.clone()))?;
        if !executors.has_executor(&executor.name) {
            return Err(CompileError::UnknownExecutor {
                node: node.id.clone(),
                executor: executor.name.clone(),
            });
        }
    }

    let mut input_refs = HashSet::new();
    for prompt in &node.prompts {
        for input in &prompt.inputs {
            if !input_refs.insert(input.identifier.as_str()) {
                return Err(CompileError::DuplicateInputRef {
                    node: node.id.clone(),
                    input: input.identifier.clone(),
                });
            }
        }
    }

    let has_outgoing = node.on_success.is_some()
        || node.on_failure.is_some()
        || node.on_incomplete.is_some()
        || !node.prompts.is_empty();
    if node.node_type != NodeType::End && !has_outgoing {
        return Err(CompileError::NoOutgoingTransition(node.id.clone()));
    }

    Ok(())
}

fn outgoing<'a>(node: &'a NodeDefinition) -> impl Iterator<Item = &'a str> {
    node.on_success
        .iter()
        .chain(node.on_failure.iter())
        .chain(node.on_incomplete.iter())
        .map(String::as_str)
        .chain(node.prompts.iter().map(|p| p.action.next_node.as_str()))
}

/// Reject cycles no PROMPT node breaks: the subgraph induced by non-PROMPT
/// nodes must be acyclic, otherwise a turn could loop without ever
/// suspending for input.
fn detect_unprompted_cycles(definition: &FlowDefinition) -> Result<(), CompileError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        InProgress,
        Done,
    }

    let non_prompt: HashMap<&str, &NodeDefinition> = definition
        .nodes
        .iter()
        .filter(|n| n.node_type != NodeType::Prompt)
        .map(|n| (n.id.as_str(), n))
        .collect();

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    for node in definition.nodes.iter().filter(|n| n.node_type != NodeType::Prompt) {
        if marks.contains_key(node.id.as_str()) {
            continue;
        }
        // Iterative DFS with an explicit stack of (node, next-edge cursor)
        let mut stack: Vec<(&str, Vec<&str>)> = vec![(
            node.id.as_str(),
            outgoing(node).filter(|t| non_prompt.contains_key(t)).collect(),
        )];
        marks.insert(node.id.as_str(), Mark::InProgress);
        while let Some((current, pending)) = stack.last_mut() {
            match pending.pop() {
                Some(next) => match marks.get(next) {
                    Some(Mark::InProgress) => {
                        return Err(CompileError::CycleWithoutPrompt(next.to_string()));
                    }
                    Some(Mark::Done) => {}
                    None => {
                        let next_node = non_prompt[next];
                        marks.insert(next, Mark::InProgress);
                        stack.push((
                            next,
                            outgoing(next_node)
                                .filter(|t| non_prompt.contains_key(t))
                                .collect(),
                        ));
                    }
                },
                None => {
                    marks.insert(*current, Mark::Done);
                    stack.pop();
                }
            }
        }
    }
    Ok(())
}

/// Unreachable nodes are only a warning, but at least one END must remain
/// reachable for the flow to ever terminate.
fn check_reachability(
    definition: &FlowDefinition,
    start_node_id: &str,
) -> Result<(), CompileError> {
    let mut reachable = HashSet::new();
    let mut queue = vec![start_node_id];
    while let Some(id) = queue.pop() {
        if !reachable.insert(id) {
            continue;
        }
        if let Some(node) = definition.node(id) {
            queue.extend(outgoing(node));
        }
    }
    for node in &definition.nodes {
        if !reachable.contains(node.id.as_str()) {
            warn!(flow_id = %definition.id, node_id = %node.id, "Node is unreachable from START");
        }
    }
    let end_reachable = definition
        .nodes
        .iter()
        .any(|n| n.node_type == NodeType::End && reachable.contains(n.id.as_str()));
    if !end_reachable {
        return Err(CompileError::NoPathToEnd);
    }
    Ok(())
}

fn compile_node(node: &NodeDefinition) -> CompiledNode {
    let actions = node
        .prompts
        .iter()
        .map(|p| CompiledAction {
            action_ref: p.action.action_ref.clone(),
            next_node: p.action.next_node.clone(),
            inputs: p.inputs.clone(),
        })
        .collect();
    // Input refs are unique per node (validated above), so the union is just
    // the concatenation in definition order.
    let required_inputs = node
        .prompts
        .iter()
        .flat_map(|p| p.inputs.iter().cloned())
        .collect();
    CompiledNode {
        id: node.id.clone(),
        kind: node.node_type,
        executor: node.executor.clone(),
        on_success: node.on_success.clone(),
        on_failure: node.on_failure.clone(),
        on_incomplete: node.on_incomplete.clone(),
        actions,
        required_inputs,
        properties: node.properties.clone(),
        meta: node.meta.clone(),
    }
}
