use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Input identifiers that must never be used to look a user up.
///
/// Credentials and one-time secrets are submitted through the same input
/// channel as searchable identifiers; executors filter them out before
/// calling [`UserProvider::identify_user`](crate::provider::UserProvider).
pub const NON_SEARCHABLE_IDENTIFIERS: [&str; 4] = ["password", "otp", "code", "nonce"];

/// The kind of end-user interaction a flow drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowType {
    Authentication,
    Registration,
    UserOnboarding,
}

impl FlowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowType::Authentication => "AUTHENTICATION",
            FlowType::Registration => "REGISTRATION",
            FlowType::UserOnboarding => "USER_ONBOARDING",
        }
    }
}

impl std::fmt::Display for FlowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FlowType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AUTHENTICATION" => Ok(FlowType::Authentication),
            "REGISTRATION" => Ok(FlowType::Registration),
            "USER_ONBOARDING" => Ok(FlowType::UserOnboarding),
            other => Err(format!("unknown flow type '{other}'")),
        }
    }
}

/// Node kinds understood by the graph compiler and the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Start,
    End,
    TaskExecution,
    Prompt,
    Decision,
}

/// The kind of value an input collects, driving client-side rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InputType {
    Text,
    Password,
    Phone,
    Otp,
    Select,
    Email,
    Number,
    Checkbox,
}

/// A single input a node collects from the end user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDescriptor {
    pub identifier: String,
    #[serde(rename = "type")]
    pub input_type: InputType,
    #[serde(default)]
    pub required: bool,
    /// Sensitive inputs (passwords, OTPs) are routed to credential maps and
    /// never echoed back or used for lookup.
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl InputDescriptor {
    pub fn new(identifier: impl Into<String>, input_type: InputType, required: bool) -> Self {
        Self {
            identifier: identifier.into(),
            input_type,
            required,
            sensitive: false,
            options: Vec::new(),
        }
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }
}

/// Reference to a registered executor, optionally pinned to a mode
/// (e.g. the SMS OTP executor runs in `send` or `verify` mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl ExecutorRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: None,
        }
    }

    pub fn with_mode(name: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: Some(mode.into()),
        }
    }
}

/// The action a prompt advances along once its inputs are satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptAction {
    #[serde(rename = "ref", default)]
    pub action_ref: String,
    pub next_node: String,
}

/// A prompt rendered by a PROMPT node: the inputs it collects and where the
/// flow goes when the client submits them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub action: PromptAction,
    #[serde(default)]
    pub inputs: Vec<InputDescriptor>,
}

/// One node of a flow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor: Option<ExecutorRef>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_incomplete: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prompts: Vec<Prompt>,
    /// UI component tree forwarded verbatim to clients on suspension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    /// Editor layout metadata. Ignored by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<serde_json::Value>,
}

impl NodeDefinition {
    pub fn new(id: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            node_type,
            executor: None,
            properties: HashMap::new(),
            on_success: None,
            on_failure: None,
            on_incomplete: None,
            prompts: Vec::new(),
            meta: None,
            layout: None,
        }
    }
}

/// A complete flow definition as stored and versioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowDefinition {
    pub id: String,
    pub handle: String,
    pub name: String,
    pub flow_type: FlowType,
    pub nodes: Vec<NodeDefinition>,
    #[serde(default = "default_version")]
    pub active_version: u32,
    /// Declarative-origin flows cannot be mutated for their full lifetime.
    #[serde(default)]
    pub is_read_only: bool,
}

fn default_version() -> u32 {
    1
}

impl FlowDefinition {
    pub fn node(&self, id: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Validate a flow handle: lowercase alphanumeric with internal dashes or
/// underscores, starting and ending alphanumeric.
pub fn is_valid_handle(handle: &str) -> bool {
    let bytes = handle.as_bytes();
    let inner = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_';
    let edge = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    match bytes {
        [] => false,
        [only] => edge(*only),
        [first, mid @ .., last] => {
            edge(*first) && edge(*last) && mid.iter().copied().all(inner)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_accepts_plain_and_internal_separators() {
        for handle in ["login", "basic-auth", "sms_otp_v2", "a", "a1", "0abc9"] {
            assert!(is_valid_handle(handle), "{handle} should be valid");
        }
    }

    #[test]
    fn handle_rejects_bad_edges_and_chars() {
        for handle in ["", "-login", "login-", "_x", "x_", "Login", "sms otp", "a.b", "é"] {
            assert!(!is_valid_handle(handle), "{handle} should be invalid");
        }
    }

    #[test]
    fn flow_type_wire_format_is_screaming_snake() {
        let json = serde_json::to_string(&FlowType::UserOnboarding).unwrap();
        assert_eq!(json, "\"USER_ONBOARDING\"");
        let back: FlowType = serde_json::from_str("\"AUTHENTICATION\"").unwrap();
        assert_eq!(back, FlowType::Authentication);
    }

    #[test]
    fn node_definition_round_trips_prompts() {
        let mut node = NodeDefinition::new("ask-creds", NodeType::Prompt);
        node.prompts.push(Prompt {
            action: PromptAction {
                action_ref: "submit".into(),
                next_node: "authenticate".into(),
            },
            inputs: vec![
                InputDescriptor::new("username", InputType::Text, true),
                InputDescriptor::new("password", InputType::Password, true).sensitive(),
            ],
        });
        let json = serde_json::to_string(&node).unwrap();
        let back: NodeDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, node);
    }
}
