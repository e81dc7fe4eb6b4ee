use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thunder_core::context::FlowContext;
use thunder_core::executor::{Executor, ExecutorError, ExecutorResponse, ExecutorType};
use thunder_core::flow::{InputDescriptor, InputType, NON_SEARCHABLE_IDENTIFIERS};
use thunder_core::provider::{ProviderError, UserProvider};
use tracing::debug;

use crate::keys;

/// Resolves a user from the submitted identifiers.
///
/// Provider errors never surface as engine errors; they are translated into
/// `Failure` so the graph can branch on an unresolved user.
pub struct IdentifyingExecutor {
    user_provider: Arc<dyn UserProvider>,
}

/// Why identification did not yield a user.
pub(crate) enum IdentifyFailure {
    NotFound,
    Other,
}

impl IdentifyFailure {
    pub(crate) fn reason(&self) -> &'static str {
        match self {
            IdentifyFailure::NotFound => "userNotFound",
            IdentifyFailure::Other => "failedToIdentifyUser",
        }
    }
}

impl IdentifyingExecutor {
    pub fn new(user_provider: Arc<dyn UserProvider>) -> Self {
        Self { user_provider }
    }

    /// Drop non-searchable identifiers (credentials, one-time secrets) and
    /// empty values from a submitted input map.
    pub(crate) fn searchable_filters(inputs: &HashMap<String, String>) -> HashMap<String, String> {
        inputs
            .iter()
            .filter(|(k, v)| {
                !NON_SEARCHABLE_IDENTIFIERS.contains(&k.as_str()) && !v.is_empty()
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub(crate) async fn identify(
        &self,
        filters: &HashMap<String, String>,
    ) -> Result<String, IdentifyFailure> {
        if filters.is_empty() {
            return Err(IdentifyFailure::Other);
        }
        match self.user_provider.identify_user(filters).await {
            Ok(user_id) => Ok(user_id),
            Err(ProviderError::UserNotFound) => Err(IdentifyFailure::NotFound),
            Err(err) => {
                debug!(error = %err, "User identification failed");
                Err(IdentifyFailure::Other)
            }
        }
    }
}

#[async_trait]
impl Executor for IdentifyingExecutor {
    fn name(&self) -> &str {
        "IdentifyingExecutor"
    }

    fn executor_type(&self) -> ExecutorType {
        ExecutorType::Authentication
    }

    fn default_inputs(&self) -> Vec<InputDescriptor> {
        vec![InputDescriptor::new(keys::USERNAME, InputType::Text, true)]
    }

    async fn execute(&self, ctx: &FlowContext) -> Result<ExecutorResponse, ExecutorError> {
        let filters = Self::searchable_filters(&ctx.user_inputs);
        match self.identify(&filters).await {
            Ok(user_id) => {
                Ok(ExecutorResponse::complete().with_runtime_data(keys::USER_ID, user_id))
            }
            Err(failure) => Ok(ExecutorResponse::failure(failure.reason())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, FakeUserProvider};
    use thunder_core::executor::ExecutionStatus;
    use thunder_core::flow::FlowType;
    use thunder_core::provider::User;

    fn alice() -> User {
        User {
            id: "user-alice".into(),
            attributes: HashMap::from([("username".into(), "alice".into())]),
            ..User::default()
        }
    }

    #[tokio::test]
    async fn identifies_user_and_stores_user_id() {
        let executor = IdentifyingExecutor::new(Arc::new(FakeUserProvider::with_user(alice())));
        let mut ctx = context(FlowType::Authentication);
        ctx.user_inputs.insert("username".into(), "alice".into());

        let resp = executor.execute(&ctx).await.unwrap();
        assert_eq!(resp.effective_status(), ExecutionStatus::Complete);
        assert_eq!(
            resp.runtime_data.get(keys::USER_ID).map(String::as_str),
            Some("user-alice")
        );
    }

    #[tokio::test]
    async fn non_searchable_identifiers_are_never_used_for_lookup() {
        let inputs = HashMap::from([
            ("username".into(), "alice".into()),
            ("password".into(), "secret".into()),
            ("otp".into(), "123456".into()),
            ("code".into(), "c".into()),
            ("nonce".into(), "n".into()),
            ("empty".into(), "".into()),
        ]);
        let filters = IdentifyingExecutor::searchable_filters(&inputs);
        assert_eq!(filters.len(), 1);
        assert!(filters.contains_key("username"));
    }

    #[tokio::test]
    async fn unknown_user_yields_failure_not_error() {
        let executor = IdentifyingExecutor::new(Arc::new(FakeUserProvider::default()));
        let mut ctx = context(FlowType::Authentication);
        ctx.user_inputs.insert("username".into(), "nobody".into());

        let resp = executor.execute(&ctx).await.unwrap();
        assert_eq!(resp.effective_status(), ExecutionStatus::Failure);
        assert_eq!(resp.failure_reason.as_deref(), Some("userNotFound"));
    }

    #[tokio::test]
    async fn empty_filters_fail_without_touching_the_provider() {
        let executor = IdentifyingExecutor::new(Arc::new(FakeUserProvider::default()));
        let mut ctx = context(FlowType::Authentication);
        ctx.user_inputs.insert("password".into(), "secret".into());

        let resp = executor.execute(&ctx).await.unwrap();
        assert_eq!(resp.failure_reason.as_deref(), Some("failedToIdentifyUser"));
    }
}
