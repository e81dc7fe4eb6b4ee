use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thunder_core::context::FlowContext;
use thunder_core::executor::{Executor, ExecutorError, ExecutorResponse, ExecutorType};
use thunder_core::flow::FlowType;
use thunder_core::provider::{GroupService, NewUser, RoleService, UserProvider};
use tracing::{debug, warn};

use crate::identify::{IdentifyFailure, IdentifyingExecutor};
use crate::{keys, properties};

/// Identifiers that are flow bookkeeping rather than user attributes.
const NON_USER_ATTRIBUTES: [&str; 10] = [
    keys::USER_ID,
    "code",
    "nonce",
    keys::OTP,
    keys::USER_TYPE,
    keys::OU_ID,
    keys::SKIP_PROVISIONING,
    keys::USER_ELIGIBLE_FOR_PROVISIONING,
    keys::USER_AUTO_PROVISIONED,
    keys::AUTHORIZED_PERMISSIONS,
];

/// Sensitive identifiers appended as credentials, never as profile
/// attributes.
const CREDENTIAL_ATTRIBUTES: [&str; 1] = [keys::PASSWORD];

/// Creates the user at the end of a registration flow (or an
/// auto-provisioning branch of authentication) and applies group/role
/// assignments from the node properties.
pub struct ProvisioningExecutor {
    identifying: IdentifyingExecutor,
    user_provider: Arc<dyn UserProvider>,
    group_service: Arc<dyn GroupService>,
    role_service: Arc<dyn RoleService>,
}

impl ProvisioningExecutor {
    pub fn new(
        user_provider: Arc<dyn UserProvider>,
        group_service: Arc<dyn GroupService>,
        role_service: Arc<dyn RoleService>,
    ) -> Self {
        Self {
            identifying: IdentifyingExecutor::new(user_provider.clone()),
            user_provider,
            group_service,
            role_service,
        }
    }

    /// Gather profile attributes from inputs, the resolved user, and runtime
    /// data, dropping bookkeeping keys and credentials.
    fn gather_attributes(ctx: &FlowContext) -> (HashMap<String, String>, HashMap<String, String>) {
        let mut attributes = HashMap::new();
        let mut credentials = HashMap::new();
        let sources = [
            &ctx.runtime_data,
            &ctx.authenticated_user.attributes,
            &ctx.user_inputs,
        ];
        for source in sources {
            for (key, value) in source {
                if value.is_empty() {
                    continue;
                }
                if CREDENTIAL_ATTRIBUTES.contains(&key.as_str()) {
                    credentials.insert(key.clone(), value.clone());
                } else if !NON_USER_ATTRIBUTES.contains(&key.as_str()) {
                    attributes.insert(key.clone(), value.clone());
                }
            }
        }
        (attributes, credentials)
    }

    async fn assign_groups_and_roles(&self, ctx: &FlowContext, user_id: &str) -> Option<String> {
        let mut failed = Vec::new();
        if let Some(group) = ctx.node_properties.get(properties::ASSIGN_GROUP) {
            if let Err(err) = self.group_service.assign(user_id, group).await {
                warn!(user_id = %user_id, group = %group, error = %err, "Group assignment failed");
                failed.push("group");
            }
        }
        if let Some(role) = ctx.node_properties.get(properties::ASSIGN_ROLE) {
            if let Err(err) = self.role_service.assign(user_id, role).await {
                warn!(user_id = %user_id, role = %role, error = %err, "Role assignment failed");
                failed.push("role");
            }
        }
        if failed.is_empty() {
            None
        } else {
            Some(format!(
                "Failed to assign groups and roles: {}",
                failed.join("; ")
            ))
        }
    }
}

#[async_trait]
impl Executor for ProvisioningExecutor {
    fn name(&self) -> &str {
        "ProvisioningExecutor"
    }

    fn executor_type(&self) -> ExecutorType {
        ExecutorType::Registration
    }

    async fn execute(&self, ctx: &FlowContext) -> Result<ExecutorResponse, ExecutorError> {
        let eligible = ctx
            .runtime_data
            .get(keys::USER_ELIGIBLE_FOR_PROVISIONING)
            .map(String::as_str)
            == Some("true");
        if ctx.flow_type == FlowType::Authentication && !eligible {
            debug!(flow_id = %ctx.flow_id, "User not eligible for auto-provisioning, skipping");
            return Ok(ExecutorResponse::complete());
        }

        let skip_provisioning = ctx
            .runtime_data
            .get(keys::SKIP_PROVISIONING)
            .map(String::as_str)
            == Some("true");

        let (attributes, credentials) = Self::gather_attributes(ctx);

        match self.identifying.identify(&attributes).await {
            Ok(existing_id) if skip_provisioning => {
                return Ok(
                    ExecutorResponse::complete().with_runtime_data(keys::USER_ID, existing_id)
                );
            }
            Ok(_) => return Ok(ExecutorResponse::failure("User already exists")),
            Err(IdentifyFailure::NotFound) | Err(IdentifyFailure::Other) => {}
        }

        let new_user = NewUser {
            ou_id: ctx.runtime_data.get(keys::OU_ID).cloned(),
            user_type: ctx.runtime_data.get(keys::USER_TYPE).cloned(),
            attributes,
            credentials,
        };
        let user_id = match self.user_provider.create_user(new_user).await {
            Ok(id) if !id.is_empty() => id,
            Ok(_) | Err(_) => {
                return Ok(ExecutorResponse::failure(
                    "Something went wrong while creating the user",
                ));
            }
        };

        // Both assignments are always attempted; partial success is still a
        // failure the flow author handles via onFailure.
        if let Some(reason) = self.assign_groups_and_roles(ctx, &user_id).await {
            return Ok(ExecutorResponse::failure(reason)
                .with_runtime_data(keys::USER_ID, user_id));
        }

        let mut resp = ExecutorResponse::complete().with_runtime_data(keys::USER_ID, user_id);
        if ctx.flow_type == FlowType::Authentication {
            resp = resp.with_runtime_data(keys::USER_AUTO_PROVISIONED, "true");
        }
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, FakeGroupService, FakeRoleService, FakeUserProvider};
    use thunder_core::executor::ExecutionStatus;
    use thunder_core::provider::User;

    struct Fixture {
        provider: Arc<FakeUserProvider>,
        groups: Arc<FakeGroupService>,
        roles: Arc<FakeRoleService>,
        executor: ProvisioningExecutor,
    }

    fn fixture(provider: FakeUserProvider, group_fail: bool, role_fail: bool) -> Fixture {
        let provider = Arc::new(provider);
        let groups = Arc::new(FakeGroupService {
            fail: group_fail,
            ..FakeGroupService::default()
        });
        let roles = Arc::new(FakeRoleService {
            fail: role_fail,
            ..FakeRoleService::default()
        });
        let executor =
            ProvisioningExecutor::new(provider.clone(), groups.clone(), roles.clone());
        Fixture {
            provider,
            groups,
            roles,
            executor,
        }
    }

    fn registration_ctx() -> FlowContext {
        let mut ctx = context(FlowType::Registration);
        ctx.user_inputs.insert("username".into(), "bob".into());
        ctx.user_inputs.insert("password".into(), "p".into());
        ctx.runtime_data.insert("userType".into(), "customer".into());
        ctx.runtime_data.insert("ouID".into(), "ou-customers".into());
        ctx
    }

    #[tokio::test]
    async fn creates_user_with_filtered_attributes_and_credentials() {
        let f = fixture(FakeUserProvider::default(), false, false);
        let ctx = registration_ctx();

        let resp = f.executor.execute(&ctx).await.unwrap();
        assert_eq!(resp.effective_status(), ExecutionStatus::Complete);
        assert_eq!(
            resp.runtime_data.get("userID").map(String::as_str),
            Some("user-1")
        );

        let created = f.provider.created.lock().unwrap();
        let user = &created[0];
        assert_eq!(user.user_type.as_deref(), Some("customer"));
        assert_eq!(user.ou_id.as_deref(), Some("ou-customers"));
        assert_eq!(user.attributes.get("username").map(String::as_str), Some("bob"));
        assert!(!user.attributes.contains_key("password"));
        assert!(!user.attributes.contains_key("userType"));
        assert_eq!(user.credentials.get("password").map(String::as_str), Some("p"));
    }

    #[tokio::test]
    async fn existing_user_fails_unless_skip_provisioning() {
        let existing = User {
            id: "user-9".into(),
            attributes: HashMap::from([("username".into(), "bob".into())]),
            ..User::default()
        };
        let f = fixture(FakeUserProvider::with_user(existing), false, false);
        let mut ctx = registration_ctx();

        let resp = f.executor.execute(&ctx).await.unwrap();
        assert_eq!(resp.effective_status(), ExecutionStatus::Failure);
        assert_eq!(resp.failure_reason.as_deref(), Some("User already exists"));

        ctx.runtime_data.insert("skipProvisioning".into(), "true".into());
        let resp = f.executor.execute(&ctx).await.unwrap();
        assert_eq!(resp.effective_status(), ExecutionStatus::Complete);
        assert_eq!(
            resp.runtime_data.get("userID").map(String::as_str),
            Some("user-9")
        );
    }

    #[tokio::test]
    async fn partial_assignment_failure_reports_the_failed_kind() {
        let f = fixture(FakeUserProvider::default(), false, true);
        let mut ctx = registration_ctx();
        ctx.node_properties.insert("assignGroup".into(), "G".into());
        ctx.node_properties.insert("assignRole".into(), "R".into());

        let resp = f.executor.execute(&ctx).await.unwrap();
        assert_eq!(resp.effective_status(), ExecutionStatus::Failure);
        assert_eq!(
            resp.failure_reason.as_deref(),
            Some("Failed to assign groups and roles: role")
        );
        // Both services were called even though one failed
        assert_eq!(f.groups.assigned.lock().unwrap().len(), 1);
        assert_eq!(f.roles.assigned.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn both_assignment_failures_are_combined() {
        let f = fixture(FakeUserProvider::default(), true, true);
        let mut ctx = registration_ctx();
        ctx.node_properties.insert("assignGroup".into(), "G".into());
        ctx.node_properties.insert("assignRole".into(), "R".into());

        let resp = f.executor.execute(&ctx).await.unwrap();
        assert_eq!(
            resp.failure_reason.as_deref(),
            Some("Failed to assign groups and roles: group; role")
        );
    }

    #[tokio::test]
    async fn create_failure_is_a_flow_failure() {
        let mut provider = FakeUserProvider::default();
        provider.fail_create = true;
        let f = fixture(provider, false, false);

        let resp = f.executor.execute(&registration_ctx()).await.unwrap();
        assert_eq!(resp.effective_status(), ExecutionStatus::Failure);
        assert_eq!(
            resp.failure_reason.as_deref(),
            Some("Something went wrong while creating the user")
        );
    }

    #[tokio::test]
    async fn authentication_flow_without_eligibility_is_a_no_op() {
        let f = fixture(FakeUserProvider::default(), false, false);
        let mut ctx = context(FlowType::Authentication);
        ctx.user_inputs.insert("username".into(), "bob".into());

        let resp = f.executor.execute(&ctx).await.unwrap();
        assert_eq!(resp.effective_status(), ExecutionStatus::Complete);
        assert!(f.provider.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn auto_provisioning_marks_the_instance() {
        let f = fixture(FakeUserProvider::default(), false, false);
        let mut ctx = context(FlowType::Authentication);
        ctx.user_inputs.insert("username".into(), "bob".into());
        ctx.runtime_data
            .insert("userEligibleForProvisioning".into(), "true".into());

        let resp = f.executor.execute(&ctx).await.unwrap();
        assert_eq!(resp.effective_status(), ExecutionStatus::Complete);
        assert_eq!(
            resp.runtime_data.get("userAutoProvisioned").map(String::as_str),
            Some("true")
        );
    }
}
