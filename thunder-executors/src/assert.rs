use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thunder_core::context::{ExecutionRecord, FlowContext};
use thunder_core::executor::{
    ExecutionStatus, Executor, ExecutorError, ExecutorResponse, ExecutorType,
};
use thunder_core::provider::{OrgUnitService, TokenIssuer, UserProvider};
use tracing::{debug, warn};

use crate::keys;

/// Tenant-level fallbacks applied when the application's assertion config
/// leaves issuer or validity unset.
#[derive(Debug, Clone)]
pub struct AssertionDefaults {
    pub issuer: String,
    pub validity_secs: u64,
}

/// Terminal executor of authentication flows.
///
/// Collapses the execution history into authenticator references, resolves
/// the configured claims, and asks the token issuer for the one-shot
/// assertion.
pub struct AuthAssertExecutor {
    user_provider: Arc<dyn UserProvider>,
    ou_service: Arc<dyn OrgUnitService>,
    token_issuer: Arc<dyn TokenIssuer>,
    defaults: AssertionDefaults,
}

impl AuthAssertExecutor {
    pub fn new(
        user_provider: Arc<dyn UserProvider>,
        ou_service: Arc<dyn OrgUnitService>,
        token_issuer: Arc<dyn TokenIssuer>,
        defaults: AssertionDefaults,
    ) -> Self {
        Self {
            user_provider,
            ou_service,
            token_issuer,
            defaults,
        }
    }

    /// Authenticator references from the execution history: one per
    /// authenticator name, ordered by the earliest step that used it. The
    /// send and verify entries of a two-mode executor collapse into one
    /// reference.
    fn authenticator_references(history: &[ExecutionRecord], own_name: &str) -> Vec<String> {
        let mut earliest: Vec<(u32, &str)> = Vec::new();
        for record in history {
            if record.status != ExecutionStatus::Complete || record.executor_name == own_name {
                continue;
            }
            match earliest.iter().position(|(_, name)| *name == record.executor_name) {
                Some(_) => {}
                None => earliest.push((record.step, record.executor_name.as_str())),
            }
        }
        earliest.sort_by_key(|(step, _)| *step);
        earliest.into_iter().map(|(_, name)| name.to_string()).collect()
    }

    async fn resolve_claims(
        &self,
        ctx: &FlowContext,
        user_id: &str,
        references: &[String],
    ) -> HashMap<String, serde_json::Value> {
        let mut claims = HashMap::new();

        claims.insert(
            "amr".to_string(),
            serde_json::Value::from(references.to_vec()),
        );
        let acr = if references.len() > 1 { "loa2" } else { "loa1" };
        claims.insert("acr".to_string(), serde_json::Value::from(acr));

        // Configured user attributes, from the session first and the user
        // store as fallback
        let wanted = &ctx.application.assertion.user_attributes;
        if !wanted.is_empty() {
            let mut stored = None;
            for name in wanted {
                let value = match ctx.authenticated_user.attributes.get(name) {
                    Some(v) => Some(v.clone()),
                    None => {
                        if stored.is_none() {
                            stored = Some(match self.user_provider.get_user(user_id).await {
                                Ok(user) => user.attributes,
                                Err(err) => {
                                    debug!(error = %err, "User attribute fetch for assertion failed");
                                    HashMap::new()
                                }
                            });
                        }
                        stored.as_ref().and_then(|attrs| attrs.get(name)).cloned()
                    }
                };
                if let Some(value) = value {
                    claims.insert(name.clone(), serde_json::Value::from(value));
                }
            }
        }

        // OU metadata
        let ou_id = ctx
            .authenticated_user
            .ou_id
            .clone()
            .or_else(|| ctx.runtime_data.get(keys::OU_ID).cloned());
        if let Some(ou_id) = ou_id {
            match self.ou_service.get_ou(&ou_id).await {
                Ok(ou) => {
                    claims.insert("ouId".into(), serde_json::Value::from(ou.id));
                    claims.insert("ouName".into(), serde_json::Value::from(ou.name));
                    claims.insert("ouHandle".into(), serde_json::Value::from(ou.handle));
                }
                Err(err) => {
                    warn!(ou_id = %ou_id, error = %err, "OU lookup for assertion claims failed");
                }
            }
        }

        if let Some(permissions) = ctx.runtime_data.get(keys::AUTHORIZED_PERMISSIONS) {
            let list: Vec<&str> = permissions.split(',').filter(|p| !p.is_empty()).collect();
            if !list.is_empty() {
                claims.insert("authorized_permissions".into(), serde_json::Value::from(list));
            }
        }

        claims
    }
}

#[async_trait]
impl Executor for AuthAssertExecutor {
    fn name(&self) -> &str {
        "AuthAssertExecutor"
    }

    fn executor_type(&self) -> ExecutorType {
        ExecutorType::Authentication
    }

    async fn execute(&self, ctx: &FlowContext) -> Result<ExecutorResponse, ExecutorError> {
        if !ctx.authenticated_user.is_authenticated {
            return Ok(ExecutorResponse::failure("User is not authenticated"));
        }
        let user_id = ctx
            .authenticated_user
            .user_id
            .clone()
            .or_else(|| ctx.runtime_data.get(keys::USER_ID).cloned());
        let Some(user_id) = user_id else {
            return Ok(ExecutorResponse::failure("User is not authenticated"));
        };

        let references =
            Self::authenticator_references(&ctx.execution_history, self.name());
        let claims = self.resolve_claims(ctx, &user_id, &references).await;

        let assertion = &ctx.application.assertion;
        let issuer = assertion.issuer.as_deref().unwrap_or(&self.defaults.issuer);
        let validity = assertion
            .validity_period_secs
            .unwrap_or(self.defaults.validity_secs);

        let token = self
            .token_issuer
            .issue(&user_id, &ctx.app_id, issuer, validity, claims)
            .await
            .map_err(|e| ExecutorError::Dependency(e.to_string()))?;

        let mut resp = ExecutorResponse::complete();
        resp.assertion = Some(token);
        Ok(resp)
    }
}
