use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thunder_core::context::FlowContext;
use thunder_core::executor::{Executor, ExecutorError, ExecutorResponse, ExecutorType};
use thunder_core::flow::InputDescriptor;
use thunder_core::provider::{ProviderError, UserProvider};

use crate::keys;

/// Collects profile attributes the current node declares, prompting for the
/// ones neither the session nor the user store can supply, and merges newly
/// submitted values back into the stored user.
pub struct AttributeCollector {
    user_provider: Arc<dyn UserProvider>,
}

impl AttributeCollector {
    pub fn new(user_provider: Arc<dyn UserProvider>) -> Self {
        Self { user_provider }
    }

    fn resolved_user_id(ctx: &FlowContext) -> Option<&str> {
        ctx.runtime_data.get(keys::USER_ID).map(String::as_str)
    }
}

#[async_trait]
impl Executor for AttributeCollector {
    fn name(&self) -> &str {
        "AttributeCollector"
    }

    fn executor_type(&self) -> ExecutorType {
        ExecutorType::Utility
    }

    async fn execute(&self, ctx: &FlowContext) -> Result<ExecutorResponse, ExecutorError> {
        let Some(user_id) = Self::resolved_user_id(ctx) else {
            return Ok(ExecutorResponse::failure(
                "User must be identified before collecting attributes",
            ));
        };
        if !ctx.authenticated_user.is_authenticated {
            return Ok(ExecutorResponse::failure(
                "User must be authenticated before collecting attributes",
            ));
        }

        let mut stored: Option<HashMap<String, String>> = None;
        let mut submitted = HashMap::new();
        let mut missing: Vec<InputDescriptor> = Vec::new();

        for descriptor in &ctx.node_inputs {
            let identifier = descriptor.identifier.as_str();
            if let Some(value) = ctx.user_inputs.get(identifier).filter(|v| !v.is_empty()) {
                submitted.insert(identifier.to_string(), value.clone());
                continue;
            }
            if ctx.authenticated_user.attributes.contains_key(identifier) {
                continue;
            }
            // Fetch the stored user once, lazily
            if stored.is_none() {
                stored = Some(match self.user_provider.get_user(user_id).await {
                    Ok(user) => user.attributes,
                    Err(ProviderError::NotImplemented) => HashMap::new(),
                    Err(err) => return Err(ExecutorError::Dependency(err.to_string())),
                });
            }
            let known = stored.as_ref().is_some_and(|attrs| {
                attrs.get(identifier).is_some_and(|v| !v.is_empty())
            });
            if !known && descriptor.required {
                missing.push(descriptor.clone());
            }
        }

        if !missing.is_empty() {
            return Ok(ExecutorResponse::user_input_required(missing));
        }

        if !submitted.is_empty() {
            self.user_provider
                .update_user(user_id, submitted.clone())
                .await
                .map_err(|e| ExecutorError::Dependency(e.to_string()))?;
            let mut user = ctx.authenticated_user.clone();
            user.attributes.extend(submitted);
            return Ok(ExecutorResponse::complete().with_authenticated_user(user));
        }
        Ok(ExecutorResponse::complete())
    }

    async fn validate_prerequisites(
        &self,
        ctx: &FlowContext,
        resp: &mut ExecutorResponse,
    ) -> bool {
        if Self::resolved_user_id(ctx).is_none() || !ctx.authenticated_user.is_authenticated {
            *resp = ExecutorResponse::failure(
                "User must be authenticated before collecting attributes",
            );
            return false;
        }
        true
    }
}
