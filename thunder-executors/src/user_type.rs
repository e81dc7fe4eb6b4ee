use std::sync::Arc;

use async_trait::async_trait;
use thunder_core::context::FlowContext;
use thunder_core::executor::{Executor, ExecutorError, ExecutorResponse, ExecutorType};
use thunder_core::flow::{FlowType, InputDescriptor, InputType};
use thunder_core::provider::{ProviderError, UserTypeRecord, UserTypeService};

use crate::keys;

/// Resolves which user type a flow operates on.
///
/// Authentication flows only require the application to allow at least one
/// type. Registration flows additionally check the self-registration policy
/// and prompt with a SELECT input when more than one type is eligible.
pub struct UserTypeResolver {
    user_types: Arc<dyn UserTypeService>,
}

impl UserTypeResolver {
    pub fn new(user_types: Arc<dyn UserTypeService>) -> Self {
        Self { user_types }
    }

    fn resolved(record: &UserTypeRecord) -> ExecutorResponse {
        let mut resp =
            ExecutorResponse::complete().with_runtime_data(keys::USER_TYPE, record.name.clone());
        if let Some(ou_id) = &record.ou_id {
            resp = resp.with_runtime_data(keys::OU_ID, ou_id.clone());
        }
        resp
    }

    fn select_prompt(options: Vec<String>) -> ExecutorResponse {
        ExecutorResponse::user_input_required(vec![InputDescriptor::new(
            keys::USER_TYPE,
            InputType::Select,
            true,
        )
        .with_options(options)])
    }

    async fn record(&self, name: &str) -> Result<Option<UserTypeRecord>, ExecutorError> {
        match self.user_types.get_by_name(name).await {
            Ok(record) => Ok(Some(record)),
            Err(ProviderError::Server(msg)) => Err(ExecutorError::Dependency(msg)),
            Err(_) => Ok(None),
        }
    }

    async fn execute_registration(
        &self,
        ctx: &FlowContext,
    ) -> Result<ExecutorResponse, ExecutorError> {
        let allowed = &ctx.application.allowed_user_types;
        if allowed.is_empty() {
            return Ok(ExecutorResponse::failure("Self-registration not available"));
        }

        if let Some(chosen) = ctx.resolve_input(keys::USER_TYPE) {
            if !allowed.iter().any(|t| t == chosen) {
                return Ok(ExecutorResponse::failure(
                    "User type is not allowed for this application",
                ));
            }
            return match self.record(chosen).await? {
                Some(record) if record.allow_self_registration => Ok(Self::resolved(&record)),
                Some(_) => Ok(ExecutorResponse::failure(
                    "Self-registration not available for the selected user type",
                )),
                None => Ok(ExecutorResponse::failure("Unknown user type")),
            };
        }

        let mut eligible = Vec::new();
        for name in allowed {
            if let Some(record) = self.record(name).await? {
                if record.allow_self_registration {
                    eligible.push(record);
                }
            }
        }
        match eligible.len() {
            0 => Ok(ExecutorResponse::failure("Self-registration not available")),
            1 => Ok(Self::resolved(&eligible[0])),
            _ => Ok(Self::select_prompt(
                eligible.into_iter().map(|r| r.name).collect(),
            )),
        }
    }

    async fn execute_onboarding(
        &self,
        ctx: &FlowContext,
    ) -> Result<ExecutorResponse, ExecutorError> {
        if let Some(chosen) = ctx.resolve_input(keys::USER_TYPE) {
            return match self.record(chosen).await? {
                Some(record) => Ok(Self::resolved(&record)),
                None => Ok(ExecutorResponse::failure("Unknown user type")),
            };
        }
        let all = self
            .user_types
            .list()
            .await
            .map_err(|e| ExecutorError::Dependency(e.to_string()))?;
        if all.is_empty() {
            return Ok(ExecutorResponse::failure("No user types configured"));
        }
        Ok(Self::select_prompt(all.into_iter().map(|r| r.name).collect()))
    }
}

#[async_trait]
impl Executor for UserTypeResolver {
    fn name(&self) -> &str {
        "UserTypeResolver"
    }

    fn executor_type(&self) -> ExecutorType {
        ExecutorType::Utility
    }

    fn default_inputs(&self) -> Vec<InputDescriptor> {
        vec![InputDescriptor::new(keys::USER_TYPE, InputType::Select, false)]
    }

    async fn execute(&self, ctx: &FlowContext) -> Result<ExecutorResponse, ExecutorError> {
        match ctx.flow_type {
            FlowType::Authentication => {
                if ctx.application.allowed_user_types.is_empty() {
                    Ok(ExecutorResponse::failure("Authentication not available"))
                } else {
                    Ok(ExecutorResponse::complete())
                }
            }
            FlowType::Registration => self.execute_registration(ctx).await,
            FlowType::UserOnboarding => self.execute_onboarding(ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, FakeUserTypeService};
    use thunder_core::executor::ExecutionStatus;

    fn service(records: Vec<(&str, bool)>) -> Arc<FakeUserTypeService> {
        Arc::new(FakeUserTypeService {
            records: records
                .into_iter()
                .map(|(name, self_reg)| UserTypeRecord {
                    name: name.into(),
                    ou_id: Some(format!("ou-{name}")),
                    allow_self_registration: self_reg,
                })
                .collect(),
        })
    }

    #[tokio::test]
    async fn authentication_requires_allowed_user_types() {
        let resolver = UserTypeResolver::new(service(vec![]));
        let ctx = context(FlowType::Authentication);

        let resp = resolver.execute(&ctx).await.unwrap();
        assert_eq!(resp.effective_status(), ExecutionStatus::Failure);
        assert_eq!(
            resp.failure_reason.as_deref(),
            Some("Authentication not available")
        );

        let mut ctx = context(FlowType::Authentication);
        ctx.application.allowed_user_types = vec!["customer".into()];
        let resp = resolver.execute(&ctx).await.unwrap();
        assert_eq!(resp.effective_status(), ExecutionStatus::Complete);
    }

    #[tokio::test]
    async fn registration_prompts_with_eligible_types() {
        let resolver =
            UserTypeResolver::new(service(vec![("customer", true), ("partner", true)]));
        let mut ctx = context(FlowType::Registration);
        ctx.application.allowed_user_types = vec!["customer".into(), "partner".into()];

        let resp = resolver.execute(&ctx).await.unwrap();
        assert_eq!(resp.effective_status(), ExecutionStatus::UserInputRequired);
        let input = &resp.inputs[0];
        assert_eq!(input.identifier, "userType");
        assert_eq!(input.options, vec!["customer", "partner"]);
    }

    #[tokio::test]
    async fn registration_auto_selects_a_single_eligible_type() {
        let resolver =
            UserTypeResolver::new(service(vec![("customer", true), ("partner", false)]));
        let mut ctx = context(FlowType::Registration);
        ctx.application.allowed_user_types = vec!["customer".into(), "partner".into()];

        let resp = resolver.execute(&ctx).await.unwrap();
        assert_eq!(resp.effective_status(), ExecutionStatus::Complete);
        assert_eq!(
            resp.runtime_data.get("userType").map(String::as_str),
            Some("customer")
        );
        assert_eq!(
            resp.runtime_data.get("ouID").map(String::as_str),
            Some("ou-customer")
        );
    }

    #[tokio::test]
    async fn registration_resolves_a_chosen_type() {
        let resolver =
            UserTypeResolver::new(service(vec![("customer", true), ("partner", true)]));
        let mut ctx = context(FlowType::Registration);
        ctx.application.allowed_user_types = vec!["customer".into(), "partner".into()];
        ctx.user_inputs.insert("userType".into(), "partner".into());

        let resp = resolver.execute(&ctx).await.unwrap();
        assert_eq!(resp.effective_status(), ExecutionStatus::Complete);
        assert_eq!(
            resp.runtime_data.get("userType").map(String::as_str),
            Some("partner")
        );
    }

    #[tokio::test]
    async fn registration_rejects_disallowed_or_unregisterable_types() {
        let resolver =
            UserTypeResolver::new(service(vec![("customer", true), ("internal", false)]));
        let mut ctx = context(FlowType::Registration);
        ctx.application.allowed_user_types = vec!["customer".into(), "internal".into()];

        ctx.user_inputs.insert("userType".into(), "admin".into());
        let resp = resolver.execute(&ctx).await.unwrap();
        assert_eq!(
            resp.failure_reason.as_deref(),
            Some("User type is not allowed for this application")
        );

        ctx.user_inputs.insert("userType".into(), "internal".into());
        let resp = resolver.execute(&ctx).await.unwrap();
        assert_eq!(
            resp.failure_reason.as_deref(),
            Some("Self-registration not available for the selected user type")
        );
    }

    #[tokio::test]
    async fn onboarding_lists_all_types_when_none_chosen() {
        let resolver =
            UserTypeResolver::new(service(vec![("customer", true), ("internal", false)]));
        let ctx = context(FlowType::UserOnboarding);

        let resp = resolver.execute(&ctx).await.unwrap();
        assert_eq!(resp.effective_status(), ExecutionStatus::UserInputRequired);
        assert_eq!(resp.inputs[0].options, vec!["customer", "internal"]);
    }
}
