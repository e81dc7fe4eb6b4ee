use async_trait::async_trait;
use thunder_core::context::FlowContext;
use thunder_core::executor::{Executor, ExecutorError, ExecutorResponse, ExecutorType};
use tracing::debug;

use crate::{keys, properties};

const DEFAULT_REQUIRED_SCOPES: [&str; 1] = ["system"];

/// Guards sensitive sub-graphs by checking caller scopes against the node's
/// `requiredScopes` property. Fails closed when the request context is
/// missing.
pub struct PermissionValidator;

impl PermissionValidator {
    pub fn new() -> Self {
        Self
    }

    fn required_scopes(ctx: &FlowContext) -> Vec<String> {
        ctx.node_properties
            .get(properties::REQUIRED_SCOPES)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .filter(|scopes: &Vec<String>| !scopes.is_empty())
            .unwrap_or_else(|| DEFAULT_REQUIRED_SCOPES.iter().map(|s| s.to_string()).collect())
    }
}

impl Default for PermissionValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for PermissionValidator {
    fn name(&self) -> &str {
        "PermissionValidator"
    }

    fn executor_type(&self) -> ExecutorType {
        ExecutorType::Utility
    }

    async fn execute(&self, ctx: &FlowContext) -> Result<ExecutorResponse, ExecutorError> {
        let Some(http_context) = &ctx.http_context else {
            return Ok(ExecutorResponse::failure(
                "Permission validation failed: missing request context",
            ));
        };

        let required = Self::required_scopes(ctx);
        let granted: Vec<String> = required
            .iter()
            .filter(|scope| http_context.scopes.contains(scope))
            .cloned()
            .collect();
        if granted.is_empty() {
            debug!(required = ?required, caller = ?http_context.scopes, "Scope check failed");
            return Ok(ExecutorResponse::failure("Insufficient permissions"));
        }

        Ok(ExecutorResponse::complete()
            .with_runtime_data(keys::AUTHORIZED_PERMISSIONS, granted.join(",")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::context;
    use thunder_core::context::HttpContext;
    use thunder_core::executor::ExecutionStatus;
    use thunder_core::flow::FlowType;

    #[tokio::test]
    async fn fails_closed_without_request_context() {
        let validator = PermissionValidator::new();
        let ctx = context(FlowType::Authentication);

        let resp = validator.execute(&ctx).await.unwrap();
        assert_eq!(resp.effective_status(), ExecutionStatus::Failure);
        assert_eq!(
            resp.failure_reason.as_deref(),
            Some("Permission validation failed: missing request context")
        );
    }

    #[tokio::test]
    async fn default_scope_is_system() {
        let validator = PermissionValidator::new();
        let mut ctx = context(FlowType::Authentication);
        ctx.http_context = Some(HttpContext {
            scopes: vec!["system".into(), "extra".into()],
            ..HttpContext::default()
        });

        let resp = validator.execute(&ctx).await.unwrap();
        assert_eq!(resp.effective_status(), ExecutionStatus::Complete);
        assert_eq!(
            resp.runtime_data.get("authorized_permissions").map(String::as_str),
            Some("system")
        );
    }

    #[tokio::test]
    async fn empty_intersection_is_rejected() {
        let validator = PermissionValidator::new();
        let mut ctx = context(FlowType::Authentication);
        ctx.node_properties
            .insert("requiredScopes".into(), "flows:write, flows:admin".into());
        ctx.http_context = Some(HttpContext {
            scopes: vec!["flows:read".into()],
            ..HttpContext::default()
        });

        let resp = validator.execute(&ctx).await.unwrap();
        assert_eq!(resp.effective_status(), ExecutionStatus::Failure);
        assert_eq!(resp.failure_reason.as_deref(), Some("Insufficient permissions"));

        ctx.http_context = Some(HttpContext {
            scopes: vec!["flows:admin".into()],
            ..HttpContext::default()
        });
        let resp = validator.execute(&ctx).await.unwrap();
        assert_eq!(resp.effective_status(), ExecutionStatus::Complete);
    }
}
