use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::{AuthenticatedUser, FlowContext};
use crate::flow::InputDescriptor;

/// Outcome class of a single executor invocation.
///
/// `Failure` is a normal flow outcome (wrong password, user exists, expired
/// OTP) that travels along `onFailure` edges. Engine-level faults are
/// expressed as [`ExecutorError`], recorded in history as `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Complete,
    UserInputRequired,
    Failure,
    Error,
}

/// Coarse classification of what an executor does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutorType {
    Authentication,
    Registration,
    Utility,
}

/// What an executor hands back to the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorResponse {
    pub status: Option<ExecutionStatus>,
    /// Inputs to collect before retrying. Takes precedence over the node's
    /// default inputs when suspending.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputDescriptor>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub runtime_data: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub additional_data: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticated_user: Option<AuthenticatedUser>,
    /// Terminal artifact (a JWT) set by assertion-issuing executors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assertion: Option<String>,
}

impl ExecutorResponse {
    pub fn complete() -> Self {
        Self {
            status: Some(ExecutionStatus::Complete),
            ..Self::default()
        }
    }

    pub fn user_input_required(inputs: Vec<InputDescriptor>) -> Self {
        Self {
            status: Some(ExecutionStatus::UserInputRequired),
            inputs,
            ..Self::default()
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            status: Some(ExecutionStatus::Failure),
            failure_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn with_runtime_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.runtime_data.insert(key.into(), value.into());
        self
    }

    pub fn with_authenticated_user(mut self, user: AuthenticatedUser) -> Self {
        self.authenticated_user = Some(user);
        self
    }

    /// The effective status; treated as `Error` when an executor forgot to
    /// set one.
    pub fn effective_status(&self) -> ExecutionStatus {
        self.status.unwrap_or(ExecutionStatus::Error)
    }
}

/// Engine-class fault raised by an executor.
///
/// Expected conditions never surface here; executors translate them into
/// [`ExecutorResponse::failure`] so the graph can branch.
#[derive(Debug)]
pub enum ExecutorError {
    /// A collaborator (user store, OTP gateway, token service) failed
    /// server-side.
    Dependency(String),
    /// The executor was invoked with a context it cannot run against
    /// (missing application config, wrong flow type wiring).
    InvalidContext(String),
}

impl std::fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorError::Dependency(msg) => write!(f, "Executor dependency failure: {msg}"),
            ExecutorError::InvalidContext(msg) => write!(f, "Invalid execution context: {msg}"),
        }
    }
}

impl std::error::Error for ExecutorError {}

/// A named, stateless unit of work invoked at a TASK_EXECUTION node.
///
/// Executors are shared singletons invoked concurrently with distinct
/// contexts; they must not retain references to a context past the return
/// of [`execute`](Executor::execute).
#[async_trait]
pub trait Executor: Send + Sync {
    fn name(&self) -> &str;

    fn executor_type(&self) -> ExecutorType;

    /// Inputs this executor needs when the node declares none of its own.
    fn default_inputs(&self) -> Vec<InputDescriptor> {
        Vec::new()
    }

    /// Inputs that must be resolvable before [`execute`](Executor::execute)
    /// is worth calling.
    fn prerequisites(&self) -> Vec<InputDescriptor> {
        Vec::new()
    }

    async fn execute(&self, ctx: &FlowContext) -> Result<ExecutorResponse, ExecutorError>;

    /// Check prerequisites against the context, mutating `resp` to request
    /// more input when they cannot be met. Returns `true` when execution can
    /// proceed.
    ///
    /// The default implementation requires every prerequisite to resolve
    /// through the standard input search order.
    async fn validate_prerequisites(
        &self,
        ctx: &FlowContext,
        resp: &mut ExecutorResponse,
    ) -> bool {
        let missing = ctx.missing_inputs(&self.prerequisites());
        if missing.is_empty() {
            return true;
        }
        resp.status = Some(ExecutionStatus::UserInputRequired);
        resp.inputs = missing;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Application;
    use crate::flow::{FlowType, InputType};

    struct NeedsUsername;

    #[async_trait]
    impl Executor for NeedsUsername {
        fn name(&self) -> &str {
            "NeedsUsername"
        }

        fn executor_type(&self) -> ExecutorType {
            ExecutorType::Utility
        }

        fn prerequisites(&self) -> Vec<InputDescriptor> {
            vec![InputDescriptor::new("username", InputType::Text, true)]
        }

        async fn execute(&self, _ctx: &FlowContext) -> Result<ExecutorResponse, ExecutorError> {
            Ok(ExecutorResponse::complete())
        }
    }

    fn ctx() -> FlowContext {
        FlowContext::new(
            "f1",
            FlowType::Authentication,
            Application {
                id: "app".into(),
                ..Application::default()
            },
            "start",
        )
    }

    #[tokio::test]
    async fn default_prerequisite_check_requests_missing_inputs() {
        let executor = NeedsUsername;
        let ctx = ctx();
        let mut resp = ExecutorResponse::default();
        assert!(!executor.validate_prerequisites(&ctx, &mut resp).await);
        assert_eq!(resp.status, Some(ExecutionStatus::UserInputRequired));
        assert_eq!(resp.inputs.len(), 1);
        assert_eq!(resp.inputs[0].identifier, "username");
    }

    #[tokio::test]
    async fn prerequisite_check_passes_from_runtime_data() {
        let executor = NeedsUsername;
        let mut ctx = ctx();
        ctx.runtime_data.insert("username".into(), "alice".into());
        let mut resp = ExecutorResponse::default();
        assert!(executor.validate_prerequisites(&ctx, &mut resp).await);
        assert_eq!(resp.status, None);
    }
}
