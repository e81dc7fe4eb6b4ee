use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::executor::ExecutionStatus;
use crate::flow::{FlowType, InputDescriptor};

/// Client-visible status of a flow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowStatus {
    #[serde(rename = "INCOMPLETE")]
    Incomplete,
    #[serde(rename = "COMPLETE")]
    Complete,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "ERROR")]
    Error,
}

/// The user resolved (and possibly authenticated) so far in a flow instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    pub is_authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ou_id: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_attributes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Assertion issuance settings carried on the application snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validity_period_secs: Option<u64>,
    /// Attribute names copied from the authenticated user into the assertion.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_attributes: Vec<String>,
}

/// Immutable snapshot of the application configuration taken at flow start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    #[serde(default)]
    pub allowed_user_types: Vec<String>,
    #[serde(default)]
    pub registration_enabled: bool,
    #[serde(default)]
    pub assertion: AssertionConfig,
}

/// Opaque carrier for transport-level request context.
///
/// The engine never inspects it; the permission validator extracts caller
/// scopes from it without pulling framework types into the core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpContext {
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// One executor invocation recorded against a flow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub node_id: String,
    pub executor_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_mode: Option<String>,
    pub status: ExecutionStatus,
    pub step: u32,
    pub end_time: DateTime<Utc>,
}

/// The mutable state of one in-flight flow traversal.
///
/// An instance is created on flow start, advanced exclusively under its
/// per-flow-id lock, and destroyed on terminal status or idle timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowContext {
    pub flow_id: String,
    pub flow_type: FlowType,
    pub app_id: String,
    pub current_node_id: String,
    /// Inputs submitted on the most recent turn, keyed by identifier.
    #[serde(default)]
    pub user_inputs: HashMap<String, String>,
    /// Durable per-instance scratch space written by executors.
    #[serde(default)]
    pub runtime_data: HashMap<String, String>,
    /// Required-input list of the current node.
    #[serde(default)]
    pub node_inputs: Vec<InputDescriptor>,
    /// Properties of the current node.
    #[serde(default)]
    pub node_properties: HashMap<String, String>,
    /// Mode of the current node's executor reference (e.g. `send`/`verify`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_mode: Option<String>,
    #[serde(default)]
    pub authenticated_user: AuthenticatedUser,
    #[serde(default)]
    pub execution_history: Vec<ExecutionRecord>,
    pub application: Application,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_context: Option<HttpContext>,
}

impl FlowContext {
    pub fn new(
        flow_id: impl Into<String>,
        flow_type: FlowType,
        application: Application,
        start_node_id: impl Into<String>,
    ) -> Self {
        Self {
            flow_id: flow_id.into(),
            flow_type,
            app_id: application.id.clone(),
            current_node_id: start_node_id.into(),
            user_inputs: HashMap::new(),
            runtime_data: HashMap::new(),
            node_inputs: Vec::new(),
            node_properties: HashMap::new(),
            executor_mode: None,
            authenticated_user: AuthenticatedUser::default(),
            execution_history: Vec::new(),
            application,
            http_context: None,
        }
    }

    /// Resolve an input value by identifier.
    ///
    /// Search order: `user_inputs` (current turn), `runtime_data` (previous
    /// turns), then the authenticated user's attributes. Empty values do not
    /// count as present.
    pub fn resolve_input(&self, identifier: &str) -> Option<&str> {
        self.user_inputs
            .get(identifier)
            .or_else(|| self.runtime_data.get(identifier))
            .or_else(|| self.authenticated_user.attributes.get(identifier))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Whether a declared input is satisfied by any input source.
    pub fn input_satisfied(&self, descriptor: &InputDescriptor) -> bool {
        !descriptor.required || self.resolve_input(&descriptor.identifier).is_some()
    }

    /// Inputs of `descriptors` that are required but not yet resolvable.
    pub fn missing_inputs(&self, descriptors: &[InputDescriptor]) -> Vec<InputDescriptor> {
        descriptors
            .iter()
            .filter(|d| !self.input_satisfied(d))
            .cloned()
            .collect()
    }

    /// Merge newly submitted inputs, overwriting duplicate keys from prior
    /// turns.
    pub fn merge_user_inputs(&mut self, inputs: HashMap<String, String>) {
        self.user_inputs.extend(inputs);
    }

    /// Merge executor-returned runtime data. Existing keys are overwritten
    /// individually; the map is never replaced wholesale.
    pub fn merge_runtime_data(&mut self, data: HashMap<String, String>) {
        self.runtime_data.extend(data);
    }

    /// The next strictly monotonic step number for a history entry.
    pub fn next_step(&self) -> u32 {
        self.execution_history
            .last()
            .map(|r| r.step + 1)
            .unwrap_or(1)
    }

    pub fn record_execution(
        &mut self,
        node_id: &str,
        executor_name: &str,
        executor_mode: Option<String>,
        status: ExecutionStatus,
    ) {
        let record = ExecutionRecord {
            node_id: node_id.to_string(),
            executor_name: executor_name.to_string(),
            executor_mode,
            status,
            step: self.next_step(),
            end_time: Utc::now(),
        };
        self.execution_history.push(record);
    }
}
