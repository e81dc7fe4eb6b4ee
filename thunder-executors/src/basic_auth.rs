use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thunder_core::context::{AuthenticatedUser, FlowContext};
use thunder_core::executor::{Executor, ExecutorError, ExecutorResponse, ExecutorType};
use thunder_core::flow::{FlowType, InputDescriptor, InputType};
use thunder_core::provider::{CredentialsVerifier, ProviderError, UserProvider};
use tracing::debug;

use crate::identify::{IdentifyFailure, IdentifyingExecutor};
use crate::keys;

/// Username/password authentication.
///
/// In authentication flows it verifies credentials and populates the
/// authenticated user. In registration flows it only checks that no user
/// exists for the submitted identifiers and echoes them back for the
/// provisioning node.
pub struct BasicAuthExecutor {
    identifying: IdentifyingExecutor,
    user_provider: Arc<dyn UserProvider>,
    credentials: Arc<dyn CredentialsVerifier>,
}

impl BasicAuthExecutor {
    pub fn new(
        user_provider: Arc<dyn UserProvider>,
        credentials: Arc<dyn CredentialsVerifier>,
    ) -> Self {
        Self {
            identifying: IdentifyingExecutor::new(user_provider.clone()),
            user_provider,
            credentials,
        }
    }

    /// Required inputs of the current node, falling back to the executor
    /// defaults when the node declares none.
    fn required_inputs(&self, ctx: &FlowContext) -> Vec<InputDescriptor> {
        if ctx.node_inputs.is_empty() {
            self.default_inputs()
        } else {
            ctx.node_inputs.clone()
        }
    }

    /// Split resolved inputs into identifier and credential maps by the
    /// `sensitive` flag.
    fn split_inputs(
        &self,
        ctx: &FlowContext,
        required: &[InputDescriptor],
    ) -> (HashMap<String, String>, HashMap<String, String>) {
        let mut identifiers = HashMap::new();
        let mut credentials = HashMap::new();
        for descriptor in required {
            if let Some(value) = ctx.resolve_input(&descriptor.identifier) {
                if descriptor.sensitive {
                    credentials.insert(descriptor.identifier.clone(), value.to_string());
                } else {
                    identifiers.insert(descriptor.identifier.clone(), value.to_string());
                }
            }
        }
        (identifiers, credentials)
    }

    async fn execute_registration(
        &self,
        identifiers: HashMap<String, String>,
    ) -> Result<ExecutorResponse, ExecutorError> {
        match self.identifying.identify(&identifiers).await {
            Ok(_) => Ok(ExecutorResponse::failure("User already exists")),
            Err(IdentifyFailure::NotFound) => {
                // Echo identifiers back so the provisioning node can consume
                // them on a later step.
                let mut resp = ExecutorResponse::complete();
                resp.runtime_data.extend(identifiers.clone());
                resp.authenticated_user = Some(AuthenticatedUser {
                    is_authenticated: false,
                    attributes: identifiers,
                    ..AuthenticatedUser::default()
                });
                Ok(resp)
            }
            Err(failure) => Ok(ExecutorResponse::failure(failure.reason())),
        }
    }

    async fn execute_authentication(
        &self,
        identifiers: HashMap<String, String>,
        credentials: HashMap<String, String>,
    ) -> Result<ExecutorResponse, ExecutorError> {
        let user_id = match self.credentials.authenticate(&identifiers, &credentials).await {
            Ok(user_id) => user_id,
            Err(err) if err.is_client() => {
                debug!(error = %err, "Credential verification rejected");
                return Ok(ExecutorResponse::failure(format!(
                    "Failed to authenticate user: {err}"
                )));
            }
            Err(err) => return Err(ExecutorError::Dependency(err.to_string())),
        };

        let attributes = match self.user_provider.get_user(&user_id).await {
            Ok(user) => user.attributes,
            Err(ProviderError::NotImplemented) => HashMap::new(),
            Err(err) => return Err(ExecutorError::Dependency(err.to_string())),
        };

        let available_attributes = attributes.keys().cloned().collect();
        let resp = ExecutorResponse::complete()
            .with_runtime_data(keys::USER_ID, user_id.clone())
            .with_authenticated_user(AuthenticatedUser {
                is_authenticated: true,
                user_id: Some(user_id),
                attributes,
                available_attributes,
                ..AuthenticatedUser::default()
            });
        Ok(resp)
    }
}

#[async_trait]
impl Executor for BasicAuthExecutor {
    fn name(&self) -> &str {
        "BasicAuthExecutor"
    }

    fn executor_type(&self) -> ExecutorType {
        ExecutorType::Authentication
    }

    fn default_inputs(&self) -> Vec<InputDescriptor> {
        vec![
            InputDescriptor::new(keys::USERNAME, InputType::Text, true),
            InputDescriptor::new(keys::PASSWORD, InputType::Password, true).sensitive(),
        ]
    }

    fn prerequisites(&self) -> Vec<InputDescriptor> {
        self.default_inputs()
    }

    async fn execute(&self, ctx: &FlowContext) -> Result<ExecutorResponse, ExecutorError> {
        let required = self.required_inputs(ctx);
        let missing = ctx.missing_inputs(&required);
        if !missing.is_empty() {
            return Ok(ExecutorResponse::user_input_required(missing));
        }

        let (identifiers, credentials) = self.split_inputs(ctx, &required);
        match ctx.flow_type {
            FlowType::Registration => self.execute_registration(identifiers).await,
            _ => self.execute_authentication(identifiers, credentials).await,
        }
    }

    async fn validate_prerequisites(
        &self,
        ctx: &FlowContext,
        resp: &mut ExecutorResponse,
    ) -> bool {
        let missing = ctx.missing_inputs(&self.required_inputs(ctx));
        if missing.is_empty() {
            return true;
        }
        *resp = ExecutorResponse::user_input_required(missing);
        false
    }
}
