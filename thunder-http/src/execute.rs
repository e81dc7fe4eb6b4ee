use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use thunder_core::context::HttpContext;
use thunder_core::error::ServiceError;
use thunder_core::flow::FlowType;
use thunder_flow::FlowResult;
use tracing::debug;

use crate::error::ApiError;
use crate::AppState;

/// Header carrying the caller's granted scopes, consumed by the permission
/// validator executor.
const SCOPES_HEADER: &str = "x-auth-scopes";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteFlowRequest {
    pub application_id: String,
    pub flow_type: Option<FlowType>,
    pub flow_id: Option<String>,
    #[serde(default)]
    pub inputs: HashMap<String, String>,
}

fn http_context(headers: &HeaderMap) -> HttpContext {
    let scopes = headers
        .get(SCOPES_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|raw| {
            raw.split([' ', ','])
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    let headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    HttpContext { scopes, headers }
}

/// `POST /flow/execute`: start a flow by type or resume one by id.
pub async fn execute_flow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ExecuteFlowRequest>,
) -> Result<Json<FlowResult>, ApiError> {
    let http_context = Some(http_context(&headers));

    let result = if let Some(flow_id) = &request.flow_id {
        debug!(flow_id = %flow_id, "Resuming flow");
        state
            .engine
            .resume(flow_id, request.inputs, http_context)
            .await
            .map_err(ServiceError::from)?
    } else {
        let Some(flow_type) = request.flow_type else {
            return Err(ServiceError::bad_request(
                "FLOW_TYPE_REQUIRED",
                "Either flowId or flowType must be provided",
            )
            .into());
        };
        let application = state
            .applications
            .get_application(&request.application_id)
            .await
            .map_err(|_| {
                ServiceError::not_found(
                    "APPLICATION_NOT_FOUND",
                    format!("Application '{}' not found", request.application_id),
                )
            })?;
        if flow_type == FlowType::Registration && !application.registration_enabled {
            return Err(ServiceError::bad_request(
                "FLOW_REGISTRATION_DISABLED",
                "Self-registration is not enabled for this application",
            )
            .into());
        }

        let handle = state.default_flows.handle_for(flow_type);
        let definition = state.flows.get_by_handle(handle, flow_type).await?;
        state
            .engine
            .start(&definition, application, request.inputs, http_context)
            .await
            .map_err(ServiceError::from)?
    };

    if result.status == thunder_core::context::FlowStatus::Error {
        return Err(ServiceError::internal(format!(
            "flow {} terminated with an execution error",
            result.flow_id
        ))
        .into());
    }
    Ok(Json(result))
}

/// `DELETE /flow/execute/{flow_id}`: cancel an in-flight instance.
pub async fn cancel_flow(
    State(state): State<AppState>,
    Path(flow_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .cancel(&flow_id)
        .await
        .map_err(ServiceError::from)?;
    Ok(StatusCode::NO_CONTENT)
}
