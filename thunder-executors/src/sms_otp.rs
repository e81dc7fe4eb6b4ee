use std::sync::Arc;

use async_trait::async_trait;
use thunder_core::context::FlowContext;
use thunder_core::executor::{Executor, ExecutorError, ExecutorResponse, ExecutorType};
use thunder_core::flow::{FlowType, InputDescriptor, InputType};
use thunder_core::provider::{OtpError, OtpService, UserProvider};
use tracing::debug;

use crate::keys;

const MODE_SEND: &str = "send";
const MODE_VERIFY: &str = "verify";

/// Two-mode SMS one-time-passcode executor.
///
/// `send` resolves the target mobile number and dispatches the OTP; `verify`
/// consumes the submitted code. The two modes run as separate nodes and
/// produce separate history entries that collapse into a single
/// authenticator reference when the assertion is emitted.
pub struct SmsOtpExecutor {
    user_provider: Arc<dyn UserProvider>,
    otp_service: Arc<dyn OtpService>,
}

impl SmsOtpExecutor {
    pub fn new(user_provider: Arc<dyn UserProvider>, otp_service: Arc<dyn OtpService>) -> Self {
        Self {
            user_provider,
            otp_service,
        }
    }

    fn mode(ctx: &FlowContext) -> &str {
        ctx.executor_mode.as_deref().unwrap_or(MODE_SEND)
    }

    /// Resolve the target mobile number: inputs, runtime data, user
    /// attributes, and for authentication flows resuming after an identify
    /// step, the user store.
    async fn resolve_mobile_number(&self, ctx: &FlowContext) -> Option<String> {
        if let Some(mobile) = ctx.resolve_input(keys::MOBILE_NUMBER) {
            return Some(mobile.to_string());
        }
        if ctx.flow_type == FlowType::Authentication {
            if let Some(user_id) = ctx.runtime_data.get(keys::USER_ID) {
                match self.user_provider.get_user(user_id).await {
                    Ok(user) => return user.attributes.get(keys::MOBILE_NUMBER).cloned(),
                    Err(err) => {
                        debug!(error = %err, "Mobile number lookup from user store failed");
                    }
                }
            }
        }
        None
    }

    async fn execute_send(&self, ctx: &FlowContext) -> Result<ExecutorResponse, ExecutorError> {
        let Some(mobile) = self.resolve_mobile_number(ctx).await else {
            return Ok(ExecutorResponse::failure(
                "Mobile number not found in user attributes or context",
            ));
        };
        match self.otp_service.send(&mobile).await {
            Ok(()) => {
                Ok(ExecutorResponse::complete().with_runtime_data(keys::MOBILE_NUMBER, mobile))
            }
            Err(OtpError::Server(msg)) => Err(ExecutorError::Dependency(msg)),
            Err(err) => Ok(ExecutorResponse::failure(err.to_string())),
        }
    }

    async fn execute_verify(&self, ctx: &FlowContext) -> Result<ExecutorResponse, ExecutorError> {
        let Some(otp) = ctx.user_inputs.get(keys::OTP).filter(|v| !v.is_empty()) else {
            return Ok(ExecutorResponse::user_input_required(vec![otp_input()]));
        };
        let Some(mobile) = self.resolve_mobile_number(ctx).await else {
            return Ok(ExecutorResponse::failure(
                "Mobile number not found in user attributes or context",
            ));
        };
        match self.otp_service.verify(&mobile, otp).await {
            Ok(()) => {
                let mut user = ctx.authenticated_user.clone();
                user.is_authenticated = true;
                if user.user_id.is_none() {
                    user.user_id = ctx.runtime_data.get(keys::USER_ID).cloned();
                }
                user.attributes.insert(keys::MOBILE_NUMBER.into(), mobile);
                Ok(ExecutorResponse::complete().with_authenticated_user(user))
            }
            Err(OtpError::Server(msg)) => Err(ExecutorError::Dependency(msg)),
            Err(err) => Ok(ExecutorResponse::failure(err.to_string())),
        }
    }
}

fn otp_input() -> InputDescriptor {
    InputDescriptor::new(keys::OTP, InputType::Otp, true).sensitive()
}

#[async_trait]
impl Executor for SmsOtpExecutor {
    fn name(&self) -> &str {
        "SMSOTPAuthExecutor"
    }

    fn executor_type(&self) -> ExecutorType {
        ExecutorType::Authentication
    }

    fn default_inputs(&self) -> Vec<InputDescriptor> {
        vec![otp_input()]
    }

    fn prerequisites(&self) -> Vec<InputDescriptor> {
        vec![InputDescriptor::new(keys::MOBILE_NUMBER, InputType::Phone, true)]
    }

    async fn execute(&self, ctx: &FlowContext) -> Result<ExecutorResponse, ExecutorError> {
        match Self::mode(ctx) {
            MODE_VERIFY => self.execute_verify(ctx).await,
            _ => self.execute_send(ctx).await,
        }
    }

    async fn validate_prerequisites(
        &self,
        ctx: &FlowContext,
        resp: &mut ExecutorResponse,
    ) -> bool {
        match Self::mode(ctx) {
            MODE_VERIFY => {
                if ctx.user_inputs.get(keys::OTP).is_some_and(|v| !v.is_empty()) {
                    true
                } else {
                    *resp = ExecutorResponse::user_input_required(vec![otp_input()]);
                    false
                }
            }
            _ => {
                if ctx.resolve_input(keys::MOBILE_NUMBER).is_some() {
                    return true;
                }
                // Authentication flows can still resolve the number from the
                // user store once a user has been identified.
                if ctx.flow_type == FlowType::Authentication
                    && ctx.runtime_data.contains_key(keys::USER_ID)
                {
                    return true;
                }
                *resp = ExecutorResponse::user_input_required(vec![InputDescriptor::new(
                    keys::MOBILE_NUMBER,
                    InputType::Phone,
                    true,
                )]);
                false
            }
        }
    }
}
