//! Derives a registration flow definition from an authentication one.
//!
//! The transformation is idempotent: running it over an already-inferred
//! definition changes nothing.

use serde_json::json;
use thunder_core::flow::{
    ExecutorRef, FlowDefinition, FlowType, InputDescriptor, InputType, NodeDefinition, NodeType,
    Prompt, PromptAction,
};

const PROVISION_NODE_ID: &str = "provision-user";
const USER_TYPE_NODE_ID: &str = "resolve-user-type";
const USER_TYPE_PROMPT_ID: &str = "select-user-type";
const PHONE_PROMPT_ID: &str = "collect-mobile-number";

const AUTH_ONLY_PROPERTIES: [&str; 1] = ["allowAuthenticationWithoutLocalUser"];

/// Substring rewrites applied to the flow name, ordered so cased variants
/// win over lowercase ones.
const NAME_REWRITES: [(&str, &str); 8] = [
    ("Authentication", "Registration"),
    ("authentication", "registration"),
    ("Sign-In", "Registration"),
    ("Sign-in", "Registration"),
    ("sign-in", "registration"),
    ("Log-in", "Registration"),
    ("Login", "Registration"),
    ("login", "registration"),
];

/// Derive a registration flow from an authentication flow definition.
pub fn infer_registration_flow(source: &FlowDefinition) -> FlowDefinition {
    let mut flow = source.clone();
    flow.flow_type = FlowType::Registration;
    flow.name = rewrite_name(&flow.name);
    flow.is_read_only = false;

    for node in &mut flow.nodes {
        for property in AUTH_ONLY_PROPERTIES {
            node.properties.remove(property);
        }
    }

    let with_layout = source.nodes.iter().any(|n| n.layout.is_some());

    insert_provisioning(&mut flow, with_layout);
    insert_user_type_resolver(&mut flow, with_layout);
    insert_phone_prompt(&mut flow, with_layout);

    flow
}

fn rewrite_name(name: &str) -> String {
    let mut out = name.to_string();
    for (from, to) in NAME_REWRITES {
        if out.contains(from) {
            out = out.replace(from, to);
        }
    }
    out
}

fn default_layout() -> serde_json::Value {
    json!({ "x": 0, "y": 0 })
}

/// Repoint every transition targeting `target` to `replacement`, leaving the
/// replacement node itself untouched.
fn rewire(nodes: &mut [NodeDefinition], target: &str, replacement: &str) {
    for node in nodes.iter_mut().filter(|n| n.id != replacement) {
        for transition in [
            &mut node.on_success,
            &mut node.on_failure,
            &mut node.on_incomplete,
        ] {
            if transition.as_deref() == Some(target) {
                *transition = Some(replacement.to_string());
            }
        }
        for prompt in &mut node.prompts {
            if prompt.action.next_node == target {
                prompt.action.next_node = replacement.to_string();
            }
        }
    }
}

/// Insert a provisioning task immediately before the assert node, or before
/// END when the flow never asserts.
fn insert_provisioning(flow: &mut FlowDefinition, with_layout: bool) {
    if flow
        .nodes
        .iter()
        .any(|n| executor_is(n, "ProvisioningExecutor"))
    {
        return;
    }
    let target = flow
        .nodes
        .iter()
        .find(|n| executor_is(n, "AuthAssertExecutor"))
        .or_else(|| flow.nodes.iter().find(|n| n.node_type == NodeType::End))
        .map(|n| n.id.clone());
    let Some(target) = target else { return };

    rewire(&mut flow.nodes, &target, PROVISION_NODE_ID);
    let mut node = NodeDefinition::new(PROVISION_NODE_ID, NodeType::TaskExecution);
    node.executor = Some(ExecutorRef::new("ProvisioningExecutor"));
    node.on_success = Some(target);
    if with_layout {
        node.layout = Some(default_layout());
    }
    flow.nodes.push(node);
}

/// Insert a user-type resolver right after START, with a SELECT prompt
/// reachable via `onIncomplete` for the multi-type case.
fn insert_user_type_resolver(flow: &mut FlowDefinition, with_layout: bool) {
    if flow.nodes.iter().any(|n| executor_is(n, "UserTypeResolver")) {
        return;
    }
    let Some(start) = flow.nodes.iter_mut().find(|n| n.node_type == NodeType::Start) else {
        return;
    };
    let Some(first) = start.on_success.clone() else { return };
    start.on_success = Some(USER_TYPE_NODE_ID.to_string());

    let mut resolver = NodeDefinition::new(USER_TYPE_NODE_ID, NodeType::TaskExecution);
    resolver.executor = Some(ExecutorRef::new("UserTypeResolver"));
    resolver.on_success = Some(first);
    resolver.on_incomplete = Some(USER_TYPE_PROMPT_ID.to_string());

    let mut prompt = NodeDefinition::new(USER_TYPE_PROMPT_ID, NodeType::Prompt);
    prompt.prompts.push(Prompt {
        action: PromptAction {
            action_ref: "select".into(),
            next_node: USER_TYPE_NODE_ID.into(),
        },
        inputs: vec![InputDescriptor::new("userType", InputType::Select, true)],
    });

    if with_layout {
        resolver.layout = Some(default_layout());
        prompt.layout = Some(default_layout());
    }
    flow.nodes.push(resolver);
    flow.nodes.push(prompt);
}

/// When the flow sends an SMS OTP and nothing collects a phone number,
/// insert a PHONE prompt before the send node.
fn insert_phone_prompt(flow: &mut FlowDefinition, with_layout: bool) {
    let collects_phone = flow.nodes.iter().any(|n| {
        n.prompts
            .iter()
            .flat_map(|p| p.inputs.iter())
            .any(|i| i.input_type == InputType::Phone)
    });
    if collects_phone {
        return;
    }
    let send_node = flow
        .nodes
        .iter()
        .find(|n| {
            n.executor
                .as_ref()
                .is_some_and(|e| e.name == "SMSOTPAuthExecutor" && e.mode.as_deref() == Some("send"))
        })
        .map(|n| n.id.clone());
    let Some(send_node) = send_node else { return };

    rewire(&mut flow.nodes, &send_node, PHONE_PROMPT_ID);
    let mut prompt = NodeDefinition::new(PHONE_PROMPT_ID, NodeType::Prompt);
    prompt.prompts.push(Prompt {
        action: PromptAction {
            action_ref: "submit".into(),
            next_node: send_node,
        },
        inputs: vec![InputDescriptor::new("mobileNumber", InputType::Phone, true)],
    });
    if with_layout {
        prompt.layout = Some(default_layout());
    }
    flow.nodes.push(prompt);
}

fn executor_is(node: &NodeDefinition, name: &str) -> bool {
    node.executor.as_ref().is_some_and(|e| e.name == name)
}
