use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thunder_core::config::FlowExecutionConfig;
use thunder_core::context::{Application, FlowContext, FlowStatus, HttpContext};
use thunder_core::error::ServiceError;
use thunder_core::executor::{ExecutionStatus, Executor, ExecutorResponse};
use thunder_core::flow::{FlowDefinition, InputDescriptor, InputType, NodeType};
use thunder_executors::{keys, ExecutorRegistry};
use thunder_graph::{CompileError, CompiledAction, CompiledNode, GraphCache};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::instance::{FlowInstance, InstanceStore};

/// The next node returned to the client on suspension.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextNode {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    pub inputs: Vec<InputDescriptor>,
}

/// Outcome of one engine turn.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowResult {
    pub flow_id: String,
    pub status: FlowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_node: Option<NextNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub additional_data: HashMap<String, String>,
}

impl FlowResult {
    fn new(flow_id: &str, status: FlowStatus) -> Self {
        Self {
            flow_id: flow_id.to_string(),
            status,
            next_node: None,
            assertion: None,
            failure_reason: None,
            additional_data: HashMap::new(),
        }
    }

    fn failed(flow_id: &str, reason: impl Into<String>) -> Self {
        let mut result = Self::new(flow_id, FlowStatus::Failed);
        result.failure_reason = Some(reason.into());
        result
    }

    fn errored(flow_id: &str) -> Self {
        let mut result = Self::new(flow_id, FlowStatus::Error);
        result.failure_reason = Some("Flow execution failed".into());
        result
    }
}

/// Client-class engine errors. Internal faults never surface here; they
/// terminate the instance as `ERROR` inside the advance.
#[derive(Debug)]
pub enum EngineError {
    InstanceNotFound(String),
    InvalidDefinition(CompileError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InstanceNotFound(flow_id) => {
                write!(f, "No active flow instance '{flow_id}'")
            }
            EngineError::InvalidDefinition(err) => write!(f, "Invalid flow definition: {err}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<EngineError> for ServiceError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InstanceNotFound(flow_id) => ServiceError::not_found(
                "FLOW_INSTANCE_NOT_FOUND",
                format!("No active flow instance '{flow_id}'"),
            ),
            EngineError::InvalidDefinition(e) => {
                ServiceError::bad_request("FLOW_DEFINITION_INVALID", e.to_string())
            }
        }
    }
}

enum StepOutcome {
    Continue,
    Done(FlowResult),
}

/// The flow execution engine: a stateful interpreter over compiled graphs.
///
/// Each advance runs under the instance lock, bounded by the per-advance
/// deadline and the iteration cap, and either suspends for input or reaches
/// a terminal state that destroys the instance.
pub struct FlowEngine {
    registry: Arc<ExecutorRegistry>,
    graph_cache: Arc<GraphCache>,
    instances: Arc<InstanceStore>,
    config: FlowExecutionConfig,
}

impl FlowEngine {
    pub fn new(
        registry: Arc<ExecutorRegistry>,
        graph_cache: Arc<GraphCache>,
        instances: Arc<InstanceStore>,
        config: FlowExecutionConfig,
    ) -> Self {
        Self {
            registry,
            graph_cache,
            instances,
            config,
        }
    }

    pub fn instances(&self) -> &Arc<InstanceStore> {
        &self.instances
    }

    /// Start a new flow instance and advance it to its first suspension or
    /// terminal state.
    pub async fn start(
        &self,
        definition: &FlowDefinition,
        application: Application,
        inputs: HashMap<String, String>,
        http_context: Option<HttpContext>,
    ) -> Result<FlowResult, EngineError> {
        let graph = self
            .graph_cache
            .get_or_compile(definition, self.registry.as_ref())
            .map_err(EngineError::InvalidDefinition)?;

        let flow_id = Uuid::now_v7().to_string();
        let mut context = FlowContext::new(
            flow_id.clone(),
            definition.flow_type,
            application,
            graph.start_node_id.clone(),
        );
        context.user_inputs = inputs;
        context.http_context = http_context;

        info!(flow_id = %flow_id, definition_id = %definition.id, flow_type = %definition.flow_type, "Starting flow instance");
        let instance = self.instances.insert(context, graph);
        let mut guard = instance.lock().await;
        Ok(self.advance_with_deadline(&instance, &mut guard).await)
    }

    /// Resume a suspended instance with freshly submitted inputs.
    pub async fn resume(
        &self,
        flow_id: &str,
        inputs: HashMap<String, String>,
        http_context: Option<HttpContext>,
    ) -> Result<FlowResult, EngineError> {
        let instance = self
            .instances
            .get(flow_id)
            .ok_or_else(|| EngineError::InstanceNotFound(flow_id.to_string()))?;
        let mut guard = instance.lock().await;
        // The winner of a lock race may have finished the flow
        if self.instances.get(flow_id).is_none() {
            return Err(EngineError::InstanceNotFound(flow_id.to_string()));
        }
        guard.merge_user_inputs(inputs);
        if http_context.is_some() {
            guard.http_context = http_context;
        }
        Ok(self.advance_with_deadline(&instance, &mut guard).await)
    }

    /// Cancel an in-flight instance. A running advance is allowed to finish
    /// but its result is discarded with the instance.
    pub async fn cancel(&self, flow_id: &str) -> Result<(), EngineError> {
        let instance = self
            .instances
            .remove(flow_id)
            .ok_or_else(|| EngineError::InstanceNotFound(flow_id.to_string()))?;
        instance.cancel_token().cancel();
        info!(flow_id = %flow_id, "Flow instance cancelled");
        Ok(())
    }

    async fn advance_with_deadline(
        &self,
        instance: &Arc<FlowInstance>,
        ctx: &mut FlowContext,
    ) -> FlowResult {
        let deadline = Duration::from_secs(self.config.advance_timeout_secs);
        let flow_id = ctx.flow_id.clone();
        match tokio::time::timeout(deadline, self.advance(instance, ctx)).await {
            Ok(result) => result,
            Err(_) => {
                error!(flow_id = %flow_id, "Advance deadline exceeded");
                self.instances.remove(&flow_id);
                FlowResult::errored(&flow_id)
            }
        }
    }

    /// Step the instance until suspension or a terminal state.
    async fn advance(&self, instance: &Arc<FlowInstance>, ctx: &mut FlowContext) -> FlowResult {
        let graph = instance.graph().clone();
        let mut assertion: Option<String> = None;
        let mut additional_data = HashMap::new();
        // Executor-requested inputs carried into a prompt reached over an
        // onIncomplete edge; they take precedence over the prompt's own
        // declared inputs.
        let mut pending_inputs: Option<Vec<InputDescriptor>> = None;

        for _ in 0..self.config.max_iterations {
            if instance.cancel_token().is_cancelled() {
                self.instances.remove(&ctx.flow_id);
                return FlowResult::failed(&ctx.flow_id, "cancelled");
            }

            let Some(node) = graph.node(&ctx.current_node_id) else {
                error!(flow_id = %ctx.flow_id, node_id = %ctx.current_node_id, "Current node missing from graph");
                self.instances.remove(&ctx.flow_id);
                return FlowResult::errored(&ctx.flow_id);
            };
            ctx.node_inputs = node.required_inputs.clone();
            ctx.node_properties = node.properties.clone();
            ctx.executor_mode = node.executor.as_ref().and_then(|e| e.mode.clone());

            let outcome = match node.kind {
                NodeType::Start => self.step_pass_through(ctx, node),
                NodeType::End => {
                    let mut result = FlowResult::new(&ctx.flow_id, FlowStatus::Complete);
                    result.assertion = assertion.take();
                    result.additional_data = std::mem::take(&mut additional_data);
                    info!(flow_id = %ctx.flow_id, "Flow complete");
                    self.instances.remove(&ctx.flow_id);
                    StepOutcome::Done(result)
                }
                NodeType::Prompt | NodeType::Decision => self.step_prompt(
                    instance,
                    ctx,
                    node,
                    &mut additional_data,
                    &mut pending_inputs,
                ),
                NodeType::TaskExecution => {
                    match self
                        .step_task(
                            instance,
                            ctx,
                            node,
                            &mut assertion,
                            &mut additional_data,
                            &mut pending_inputs,
                        )
                        .await
                    {
                        Ok(outcome) => outcome,
                        Err(result) => return result,
                    }
                }
            };

            match outcome {
                StepOutcome::Continue => continue,
                StepOutcome::Done(result) => return result,
            }
        }

        error!(
            flow_id = %ctx.flow_id,
            cap = self.config.max_iterations,
            "Iteration cap exceeded, terminating flow"
        );
        self.instances.remove(&ctx.flow_id);
        FlowResult::errored(&ctx.flow_id)
    }

    fn step_pass_through(&self, ctx: &mut FlowContext, node: &CompiledNode) -> StepOutcome {
        let next = node
            .on_success
            .as_deref()
            .or(node.on_incomplete.as_deref())
            .or(node.on_failure.as_deref());
        match next {
            Some(next) => {
                ctx.current_node_id = next.to_string();
                StepOutcome::Continue
            }
            None => {
                error!(flow_id = %ctx.flow_id, node_id = %node.id, "Node has no transition to follow");
                self.instances.remove(&ctx.flow_id);
                StepOutcome::Done(FlowResult::errored(&ctx.flow_id))
            }
        }
    }

    /// PROMPT and DECISION nodes: advance along a satisfied action or
    /// suspend with the pending input descriptors.
    fn step_prompt(
        &self,
        instance: &Arc<FlowInstance>,
        ctx: &mut FlowContext,
        node: &CompiledNode,
        additional_data: &mut HashMap<String, String>,
        pending_inputs: &mut Option<Vec<InputDescriptor>>,
    ) -> StepOutcome {
        if node.actions.is_empty() {
            // Prompt with plain transitions: gate on the node's own inputs
            let missing = ctx.missing_inputs(&node.required_inputs);
            if missing.is_empty() {
                return self.step_pass_through(ctx, node);
            }
            let inputs = pending_inputs.take().unwrap_or(missing);
            return StepOutcome::Done(self.suspend(
                instance,
                ctx,
                node,
                inputs,
                std::mem::take(additional_data),
            ));
        }

        if let Some(action) = self.select_action(ctx, node) {
            let missing = ctx.missing_inputs(&action.inputs);
            if missing.is_empty() {
                ctx.current_node_id = action.next_node.clone();
                return StepOutcome::Continue;
            }
            let inputs = pending_inputs.take().unwrap_or(missing);
            return StepOutcome::Done(self.suspend(
                instance,
                ctx,
                node,
                inputs,
                std::mem::take(additional_data),
            ));
        }

        // No selectable action yet: ask the client to choose one
        let mut pending: Vec<InputDescriptor> = vec![InputDescriptor::new(
            keys::ACTION,
            InputType::Select,
            true,
        )
        .with_options(node.actions.iter().map(|a| a.action_ref.clone()).collect())];
        for action in &node.actions {
            for input in ctx.missing_inputs(&action.inputs) {
                if !pending.iter().any(|p| p.identifier == input.identifier) {
                    pending.push(input);
                }
            }
        }
        StepOutcome::Done(self.suspend(
            instance,
            ctx,
            node,
            pending,
            std::mem::take(additional_data),
        ))
    }

    fn select_action<'g>(
        &self,
        ctx: &FlowContext,
        node: &'g CompiledNode,
    ) -> Option<&'g CompiledAction> {
        if let Some(chosen) = ctx.user_inputs.get(keys::ACTION) {
            return node.action(chosen);
        }
        if node.actions.len() == 1 {
            return node.actions.first();
        }
        node.actions
            .iter()
            .find(|a| !a.inputs.is_empty() && ctx.missing_inputs(&a.inputs).is_empty())
    }

    async fn step_task(
        &self,
        instance: &Arc<FlowInstance>,
        ctx: &mut FlowContext,
        node: &CompiledNode,
        assertion: &mut Option<String>,
        additional_data: &mut HashMap<String, String>,
        pending_inputs: &mut Option<Vec<InputDescriptor>>,
    ) -> Result<StepOutcome, FlowResult> {
        let Some(executor_ref) = node.executor.as_ref() else {
            error!(flow_id = %ctx.flow_id, node_id = %node.id, "Task node carries no executor");
            self.instances.remove(&ctx.flow_id);
            return Err(FlowResult::errored(&ctx.flow_id));
        };
        let Some(executor) = self.registry.get(&executor_ref.name) else {
            error!(flow_id = %ctx.flow_id, executor = %executor_ref.name, "Executor missing from registry");
            self.instances.remove(&ctx.flow_id);
            return Err(FlowResult::errored(&ctx.flow_id));
        };

        let mut resp = ExecutorResponse::default();
        let proceed = executor.validate_prerequisites(ctx, &mut resp).await;
        if proceed {
            resp = match self.run_executor(ctx, executor.as_ref()).await {
                Ok(resp) => resp,
                Err(result) => return Err(result),
            };
            ctx.record_execution(
                &node.id,
                executor.name(),
                executor_ref.mode.clone(),
                resp.effective_status(),
            );
        } else if resp.effective_status() == ExecutionStatus::Failure {
            ctx.record_execution(
                &node.id,
                executor.name(),
                executor_ref.mode.clone(),
                ExecutionStatus::Failure,
            );
        }

        ctx.merge_runtime_data(std::mem::take(&mut resp.runtime_data));
        additional_data.extend(std::mem::take(&mut resp.additional_data));
        if let Some(user) = resp.authenticated_user.take() {
            ctx.authenticated_user = user;
        }
        if let Some(token) = resp.assertion.take() {
            *assertion = Some(token);
        }

        match resp.effective_status() {
            ExecutionStatus::Complete => match &node.on_success {
                Some(next) => {
                    ctx.current_node_id = next.clone();
                    Ok(StepOutcome::Continue)
                }
                None => {
                    let mut result = FlowResult::new(&ctx.flow_id, FlowStatus::Complete);
                    result.assertion = assertion.take();
                    result.additional_data = std::mem::take(additional_data);
                    info!(flow_id = %ctx.flow_id, "Flow complete");
                    self.instances.remove(&ctx.flow_id);
                    Ok(StepOutcome::Done(result))
                }
            },
            ExecutionStatus::UserInputRequired => {
                let inputs = if !resp.inputs.is_empty() {
                    resp.inputs
                } else if !node.required_inputs.is_empty() {
                    node.required_inputs.clone()
                } else {
                    executor.default_inputs()
                };
                // An onIncomplete edge hands the collection off to a prompt
                // node; the executor's inputs travel with it
                if let Some(next) = &node.on_incomplete {
                    *pending_inputs = Some(inputs);
                    ctx.current_node_id = next.clone();
                    return Ok(StepOutcome::Continue);
                }
                Ok(StepOutcome::Done(self.suspend(
                    instance,
                    ctx,
                    node,
                    inputs,
                    std::mem::take(additional_data),
                )))
            }
            ExecutionStatus::Failure => match &node.on_failure {
                Some(next) => {
                    ctx.current_node_id = next.clone();
                    Ok(StepOutcome::Continue)
                }
                None => {
                    let reason = resp
                        .failure_reason
                        .unwrap_or_else(|| "Flow failed".to_string());
                    info!(flow_id = %ctx.flow_id, reason = %reason, "Flow failed");
                    self.instances.remove(&ctx.flow_id);
                    Ok(StepOutcome::Done(FlowResult::failed(&ctx.flow_id, reason)))
                }
            },
            ExecutionStatus::Error => {
                error!(flow_id = %ctx.flow_id, node_id = %node.id, "Executor returned no usable status");
                self.instances.remove(&ctx.flow_id);
                Ok(StepOutcome::Done(FlowResult::errored(&ctx.flow_id)))
            }
        }
    }

    /// Run an executor under the per-call deadline, translating faults and
    /// timeouts into an errored terminal state.
    async fn run_executor(
        &self,
        ctx: &mut FlowContext,
        executor: &dyn Executor,
    ) -> Result<ExecutorResponse, FlowResult> {
        let deadline = Duration::from_secs(self.config.executor_timeout_secs);
        match tokio::time::timeout(deadline, executor.execute(ctx)).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(err)) => {
                error!(flow_id = %ctx.flow_id, executor = %executor.name(), error = %err, "Executor failed");
                let node_id = ctx.current_node_id.clone();
                let mode = ctx.executor_mode.clone();
                ctx.record_execution(&node_id, executor.name(), mode, ExecutionStatus::Error);
                self.instances.remove(&ctx.flow_id);
                Err(FlowResult::errored(&ctx.flow_id))
            }
            Err(_) => {
                error!(flow_id = %ctx.flow_id, executor = %executor.name(), "Executor deadline exceeded");
                self.instances.remove(&ctx.flow_id);
                Err(FlowResult::errored(&ctx.flow_id))
            }
        }
    }

    fn suspend(
        &self,
        instance: &Arc<FlowInstance>,
        ctx: &mut FlowContext,
        node: &CompiledNode,
        inputs: Vec<InputDescriptor>,
        additional_data: HashMap<String, String>,
    ) -> FlowResult {
        if inputs.is_empty() {
            warn!(flow_id = %ctx.flow_id, node_id = %node.id, "Suspending with no pending inputs");
        }
        debug!(flow_id = %ctx.flow_id, node_id = %node.id, "Flow awaiting input");
        instance.touch();
        let mut result = FlowResult::new(&ctx.flow_id, FlowStatus::Incomplete);
        result.next_node = Some(NextNode {
            id: node.id.clone(),
            meta: node.meta.clone(),
            inputs,
        });
        result.additional_data = additional_data;
        result
    }
}
